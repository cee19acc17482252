//! Task prompt templates
//!
//! A stage's prompt is a role description plus a task template with named
//! `{placeholder}` slots bound per record. Verifier feedback from a prior
//! attempt is appended under an explicit label so the model can tell
//! corrections apart from the task instructions themselves.

use std::collections::BTreeMap;

/// Label introducing prior-attempt feedback in a regenerated prompt
const FEEDBACK_LABEL: &str =
    "Feedback on your previous attempt (this is not part of the task; fix these issues first):";

/// A task template with named placeholders
#[derive(Debug, Clone)]
pub struct TaskTemplate {
    /// Natural-language role description, e.g. "You are an expert test
    /// designer for a financial application"
    pub role: String,
    /// Task body; `{name}` slots are bound per record
    pub task: String,
}

impl TaskTemplate {
    pub fn new(role: impl Into<String>, task: impl Into<String>) -> Self {
        Self {
            role: role.into(),
            task: task.into(),
        }
    }

    /// Renders the template with the given bindings.
    ///
    /// Unbound placeholders are left verbatim; a closed-world stage prompt
    /// should bind everything it declares.
    pub fn render(&self, bindings: &PromptBindings) -> String {
        let mut body = self.task.clone();
        for (name, value) in &bindings.values {
            body = body.replace(&format!("{{{}}}", name), value);
        }

        let mut prompt = format!("{}\n\n{}", self.role, body);

        if let Some(extra) = &bindings.extra_instructions {
            prompt.push_str("\n\nAdditional instructions:\n");
            prompt.push_str(extra);
        }

        if let Some(feedback) = &bindings.feedback {
            prompt.push_str("\n\n");
            prompt.push_str(FEEDBACK_LABEL);
            prompt.push('\n');
            prompt.push_str(feedback);
        }

        prompt
    }
}

/// Per-record values bound into a task template
#[derive(Debug, Clone, Default)]
pub struct PromptBindings {
    values: BTreeMap<String, String>,
    extra_instructions: Option<String>,
    feedback: Option<String>,
}

impl PromptBindings {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn bind(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.values.insert(name.into(), value.into());
        self
    }

    pub fn set(&mut self, name: impl Into<String>, value: impl Into<String>) {
        self.values.insert(name.into(), value.into());
    }

    /// Free-text operator instructions appended after the task body
    pub fn with_extra_instructions(mut self, extra: Option<String>) -> Self {
        self.extra_instructions = extra.filter(|s| !s.trim().is_empty());
        self
    }

    /// Correction text from the previous verification attempt
    pub fn set_feedback(&mut self, feedback: Option<String>) {
        self.feedback = feedback.filter(|s| !s.trim().is_empty());
    }

    pub fn feedback(&self) -> Option<&str> {
        self.feedback.as_deref()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn template() -> TaskTemplate {
        TaskTemplate::new(
            "You are an expert test designer.",
            "Generate cases for scenario {scenario_id} using input:\n{input}",
        )
    }

    #[test]
    fn test_render_substitutes_placeholders() {
        let bindings = PromptBindings::new()
            .bind("scenario_id", "SC-004")
            .bind("input", "{\"dimension\": \"Order\"}");

        let prompt = template().render(&bindings);
        assert!(prompt.starts_with("You are an expert test designer."));
        assert!(prompt.contains("scenario SC-004"));
        assert!(prompt.contains("{\"dimension\": \"Order\"}"));
        assert!(!prompt.contains("{scenario_id}"));
    }

    #[test]
    fn test_render_without_feedback_has_no_label() {
        let bindings = PromptBindings::new().bind("scenario_id", "SC-001").bind("input", "x");
        let prompt = template().render(&bindings);
        assert!(!prompt.contains("previous attempt"));
    }

    #[test]
    fn test_render_appends_labeled_feedback() {
        let mut bindings = PromptBindings::new().bind("scenario_id", "SC-001").bind("input", "x");
        bindings.set_feedback(Some("The cum_amt column ignored step 2.".to_string()));

        let prompt = template().render(&bindings);
        assert!(prompt.contains(FEEDBACK_LABEL));
        assert!(prompt.ends_with("The cum_amt column ignored step 2."));
    }

    #[test]
    fn test_blank_feedback_is_dropped() {
        let mut bindings = PromptBindings::new();
        bindings.set_feedback(Some("   ".to_string()));
        assert!(bindings.feedback().is_none());
    }

    #[test]
    fn test_extra_instructions_appended() {
        let bindings = PromptBindings::new()
            .bind("scenario_id", "SC-001")
            .bind("input", "x")
            .with_extra_instructions(Some("Limit to 5 cases.".to_string()));

        let prompt = template().render(&bindings);
        assert!(prompt.contains("Additional instructions:\nLimit to 5 cases."));
    }

    #[test]
    fn test_unbound_placeholder_left_verbatim() {
        let prompt = template().render(&PromptBindings::new().bind("input", "x"));
        assert!(prompt.contains("{scenario_id}"));
    }
}
