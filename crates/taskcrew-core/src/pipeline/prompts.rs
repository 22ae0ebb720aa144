//! Prompt text for each phase.
//!
//! Inputs arrive already budgeted; these functions only lay them out.

use crate::collaborators::{FeedbackItem, IntegrationRequest};
use crate::roles::Role;

const HURDLE_FORMAT: &str = "\
If you see risks or blockers, list each one as:
Issue: <short description>
Severity: <low|medium|high|critical>
Suggestion: <how to handle it>";

const ARTIFACT_FORMAT: &str = "\
Emit every file as a fenced block whose header names the language and path,
for example ```rust:src/main.rs";

fn codebase_section(codebase: Option<&str>) -> String {
    codebase
        .map(|c| format!("\n\n**Existing Codebase Structure:**\n{c}"))
        .unwrap_or_default()
}

pub fn plan(request: &str, codebase: Option<&str>) -> String {
    format!(
        "Analyze the following project request and create a development plan.\n\n\
         {request}{codebase}\n\n\
         Cover architecture, technology choices, file layout, key components, \
         dependencies, an implementation roadmap, security and data-handling \
         concerns, and the testing strategy.\n\n{HURDLE_FORMAT}",
        codebase = codebase_section(codebase),
    )
}

pub fn build(request: &str, plan: Option<&str>, codebase: Option<&str>) -> String {
    let plan = plan
        .map(|p| format!("\n\nDevelopment plan:\n{p}"))
        .unwrap_or_default();
    format!(
        "Implement the following request.\n\n{request}{plan}{codebase}\n\n\
         Write complete, working code.\n{ARTIFACT_FORMAT}\n\n{HURDLE_FORMAT}",
        codebase = codebase_section(codebase),
    )
}

pub fn review(plan: Option<&str>, implementation: &str) -> String {
    let plan = plan
        .map(|p| format!("Original plan:\n{p}\n\n"))
        .unwrap_or_default();
    format!(
        "Review the implementation below against the plan.\n\n{plan}\
         Implementation:\n{implementation}\n\n\
         Check correctness, plan adherence, error handling, security and test coverage. \
         Report figures as `Complexity: <n>`, `Readability: <n>`, \
         `Maintainability: <n>` and `DRY violations: <n>`.\n\n{HURDLE_FORMAT}"
    )
}

pub fn test(implementation: &str, plan: Option<&str>, codebase: Option<&str>) -> String {
    let plan = plan
        .map(|p| format!("\n\nPlan:\n{p}"))
        .unwrap_or_default();
    format!(
        "Write and run tests for the implementation below.\n\n\
         Implementation:\n{implementation}{plan}{codebase}\n\n\
         {ARTIFACT_FORMAT}\n\
         Finish with `All tests passed` or `Tests failed: <details>`.\n\n{HURDLE_FORMAT}",
        codebase = codebase_section(codebase),
    )
}

pub fn integration_info(review: Option<&str>, test_results: Option<&str>, branch: &str) -> String {
    let review = review
        .map(|r| format!("\n\nReview summary:\n{r}"))
        .unwrap_or_default();
    let tests = test_results
        .map(|t| format!("\n\nTest results:\n{t}"))
        .unwrap_or_default();
    format!(
        "Draft an integration request for branch `{branch}`.{review}{tests}\n\n\
         Answer with JSON `{{\"title\": ..., \"body\": ...}}` or with \
         `Title:` and `Description:` lines."
    )
}

pub fn integration_review(role: Role, request: &IntegrationRequest, excerpt: &str) -> String {
    format!(
        "As the {role}, review integration request #{number}: {title}\n\n{body}\n\n\
         Relevant work:\n{excerpt}\n\n\
         Point out anything that must be fixed before merging. If nothing is \
         outstanding, say the request is approved.",
        number = request.number,
        title = request.title,
        body = request.body,
    )
}

pub fn merge_decision(request: &IntegrationRequest, comments: &[FeedbackItem]) -> String {
    let comments = if comments.is_empty() {
        "No comments on this request yet.".to_string()
    } else {
        comments
            .iter()
            .map(|c| format!("[{}]:\n{}", c.author, c.body))
            .collect::<Vec<_>>()
            .join("\n\n")
    };
    format!(
        "Decide whether integration request #{number} ({url}) is ready to merge.\n\n\
         Comments and feedback:\n{comments}\n\n\
         Judge only from the feedback above. Start your answer with exactly one of\n\
         DECISION: APPROVED\nDECISION: NOT_READY\n\
         then give `Merge method: <merge|squash|rebase>`, the remaining issues if \
         not ready, and a `Commit message:` if approved.",
        number = request.number,
        url = request.url,
    )
}

pub fn decision_comment(decision_text: &str) -> String {
    format!("Merge deferred.\n\n{decision_text}")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_build_prompt_sections() {
        let p = build("Make a calculator", Some("1. parser"), None);
        assert!(p.contains("Make a calculator"));
        assert!(p.contains("Development plan:\n1. parser"));
        assert!(!p.contains("Existing Codebase"));
        assert!(p.contains("Issue:"));
    }

    #[test]
    fn test_merge_prompt_lists_comments() {
        let req = IntegrationRequest {
            number: 3,
            url: "file:///tmp#request-3".into(),
            title: "t".into(),
            body: "b".into(),
            branch: "feature/x".into(),
            base: "main".into(),
        };
        let p = merge_decision(&req, &[FeedbackItem::new("tester", "all good")]);
        assert!(p.contains("[tester]:\nall good"));
        assert!(p.contains("DECISION: NOT_READY"));
    }
}
