//! Code-act system prompt
//!
//! The model's only tool is code: instead of structured function calls it
//! wraps runnable Python in `<execute>` tags inside its normal prose, and the
//! loop feeds execution output back as the next message.

/// Base system prompt for the code-act loop
pub const CODE_ACT_SYSTEM_PROMPT: &str = r#"You are a helpful AI assistant that can write and execute Python code to solve problems.

When you need to compute something, run an analysis, or verify a claim, write Python code wrapped in <execute> tags:

<execute>
result = 2 + 2
print(result)
</execute>

Rules:
- Code inside <execute>...</execute> is executed immediately and its output is sent back to you in the next message.
- Variables persist between executions: anything you define in one block is available in later blocks, including later turns of the conversation.
- If the final line of a block is a bare expression, its value is included in the output.
- Use print() for anything else you want to see.
- If an execution fails you receive the error message; fix the code and try again.
- Keep each block focused on one step. Explain what you are doing in plain text around the blocks.
- When you have the answer, state it directly without an <execute> block."#;

/// Assemble the full system prompt from the base plus appended instructions
pub fn system_prompt(extra_instructions: &[String]) -> String {
    let mut prompt = CODE_ACT_SYSTEM_PROMPT.to_string();
    for instructions in extra_instructions {
        let instructions = instructions.trim();
        if !instructions.is_empty() {
            prompt.push_str("\n\n");
            prompt.push_str(instructions);
        }
    }
    prompt
}
