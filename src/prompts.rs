//! 角色扮演用到的提示词模板。占位符写作 `{name}`。

use once_cell::sync::Lazy;
use regex::{Captures, Regex};

/// 任务完成标记，区分大小写，只能用英文
pub const TASK_DONE_MARKER: &str = "CAMEL_TASK_DONE";

pub const TASK_SPECIFY_PROMPT: &str = "Here is a task that {assistant_role} will help {user_role} to complete: {task}.
Please make it more specific. Be creative and imaginative.
Please reply with the specified task in {word_limit} words or less. Do not add anything else.";

pub const TASK_SPECIFIER_SYSTEM_PROMPT: &str = "You can make a task more specific.";

pub const ASSISTANT_PROMPT: &str = "===== RULES OF ASSISTANT =====
Never forget you are a {assistant_role} and I am a {user_role}. Never flip roles!
We share a common interest in collaborating to successfully complete the task by role-playing.
    1. I always provide you with instructions, one at a time.
    2. You are here to assist me in completing the TASK. Never forget our TASK!
    3. You must write a specific Thought that solves the requested instruction, then perform the Action and report the Feedback.
    4. If you call a function, make sure the JSON arguments are valid.
    5. When I tell you the TASK is completed, you MUST reply with \"CAMEL_TASK_DONE\" in English.
    6. You may doubt my instruction if it is wrong, and explain why.

===== TASK =====
{task}

===== ANSWER TEMPLATE =====
Thought:
    <YOUR_THOUGHT>
Action:
    <YOUR_ACTION>
Feedback:
    <YOUR_FEEDBACK_OF_FUNCTION_CALLING>
";

pub const USER_PROMPT: &str = "===== RULES OF USER =====
Never forget you are a {user_role} and I am a {assistant_role}. Never flip roles!
We share a common interest in collaborating to successfully complete the task by role-playing.
    1. You always give me instructions to complete the TASK, based on our previous conversation. Never repeat an earlier instruction.
    2. I am here to assist you in completing the TASK. Never forget our TASK!
    3. Judge my previous answer and point out any logical conflict. If there is one, ask me to use role_playing_function to think deeper.
    4. Give one specific instruction at a time. Instruct, do not ask questions.
    5. \"Input\" provides the current status and known information for the instruction.
    6. Before finishing, instruct me to summarize the final answer for the TASK.
    7. Once the TASK is completed, you MUST reply with \"CAMEL_TASK_DONE\" in English.

===== TASK =====
{task}

===== ANSWER TEMPLATE =====
Judgement:
    <YOUR_JUDGEMENT_OF_ASSISTANT'S_RESPONSE>
Instruction:
    <YOUR_INSTRUCTION>
Input:
    <YOUR_INPUT>
";

pub const INIT_CHAT_PROMPT: &str =
    "Now start to give me instructions one by one. Only reply with Instruction and Input.";

pub const OUTPUT_LANGUAGE_PROMPT: &str =
    "\nRegardless of the input language, you must output text in {output_language}.";

static PLACEHOLDER: Lazy<Regex> = Lazy::new(|| Regex::new(r"\{(\w+)\}").unwrap());

/// 用给定的值替换模板中的 `{key}`，未出现的占位符保持原样。
/// 只扫描模板一遍，代入的值里即使含有 `{key}` 也不会再被替换。
pub fn render(template: &str, values: &[(&str, &str)]) -> String {
    PLACEHOLDER
        .replace_all(template, |caps: &Captures| {
            values
                .iter()
                .find(|(key, _)| *key == &caps[1])
                .map(|(_, value)| value.to_string())
                .unwrap_or_else(|| caps[0].to_string())
        })
        .into_owned()
}

/// 生成 assistant / user 的系统提示
pub fn system_prompts(
    assistant_role: &str,
    user_role: &str,
    task: &str,
    output_language: Option<&str>,
) -> (String, String) {
    let values = [
        ("assistant_role", assistant_role),
        ("user_role", user_role),
        ("task", task),
    ];

    let mut assistant = render(ASSISTANT_PROMPT, &values);
    let mut user = render(USER_PROMPT, &values);

    if let Some(language) = output_language {
        let suffix = render(OUTPUT_LANGUAGE_PROMPT, &[("output_language", language)]);
        assistant.push_str(&suffix);
        user.push_str(&suffix);
    }

    (assistant, user)
}

/// 去掉完成标记
pub fn strip_done_marker(text: &str) -> String {
    text.replace(TASK_DONE_MARKER, "")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn render_fills_known_placeholders_only() {
        let out = render("{a} and {b}", &[("a", "x")]);
        assert_eq!(out, "x and {b}");
    }

    #[test]
    fn substituted_values_are_not_rendered_again() {
        let out = render(
            "{assistant_role} works on {task}",
            &[("assistant_role", "Agent {task}"), ("task", "the proof")],
        );
        assert_eq!(out, "Agent {task} works on the proof");
    }

    #[test]
    fn role_names_with_braces_survive_system_prompts() {
        let (assistant, _) = system_prompts("Coder {task}", "Reviewer", "ship it", None);
        assert!(assistant.contains("you are a Coder {task} and I am a Reviewer"));
    }

    #[test]
    fn system_prompts_mention_both_roles_and_task() {
        let (assistant, user) = system_prompts("Tutor", "Student", "prove p > 1/8", Some("Chinese"));
        assert!(assistant.contains("you are a Tutor and I am a Student"));
        assert!(user.contains("you are a Student and I am a Tutor"));
        assert!(assistant.contains("prove p > 1/8"));
        assert!(user.ends_with("you must output text in Chinese."));
        assert!(!assistant.contains("{task}"));
    }

    #[test]
    fn strip_removes_every_marker() {
        assert_eq!(strip_done_marker("ok CAMEL_TASK_DONE CAMEL_TASK_DONE"), "ok  ");
        assert_eq!(strip_done_marker("camel_task_done"), "camel_task_done");
    }
}
