//! The reedline prompt, reflecting the session phase.

use reedline::{Prompt, PromptEditMode, PromptHistorySearch, PromptHistorySearchStatus};
use std::borrow::Cow;

pub struct ShellPrompt {
    connection: Option<String>,
    loaded: bool,
}

impl ShellPrompt {
    pub fn new() -> Self {
        Self {
            connection: None,
            loaded: false,
        }
    }

    /// Refresh the prompt after a command ran.
    pub fn update(&mut self, connection: Option<&str>, loaded: bool) {
        self.connection = connection.map(str::to_string);
        self.loaded = loaded;
    }
}

impl Default for ShellPrompt {
    fn default() -> Self {
        Self::new()
    }
}

impl Prompt for ShellPrompt {
    fn render_prompt_left(&self) -> Cow<'_, str> {
        match &self.connection {
            Some(connection) => Cow::Owned(format!("schemashell {}> ", connection)),
            None => Cow::Borrowed("schemashell> "),
        }
    }

    fn render_prompt_right(&self) -> Cow<'_, str> {
        if self.loaded {
            Cow::Borrowed("[catalog loaded]")
        } else {
            Cow::Borrowed("")
        }
    }

    fn render_prompt_indicator(&self, edit_mode: PromptEditMode) -> Cow<'_, str> {
        match edit_mode {
            PromptEditMode::Default | PromptEditMode::Emacs => Cow::Borrowed(""),
            PromptEditMode::Vi(vi_mode) => match vi_mode {
                reedline::PromptViMode::Insert => Cow::Borrowed("[INS] "),
                reedline::PromptViMode::Normal => Cow::Borrowed("[NOR] "),
            },
            PromptEditMode::Custom(_) => Cow::Borrowed(""),
        }
    }

    fn render_prompt_multiline_indicator(&self) -> Cow<'_, str> {
        Cow::Borrowed("... ")
    }

    fn render_prompt_history_search_indicator(
        &self,
        history_search: PromptHistorySearch,
    ) -> Cow<'_, str> {
        let prefix = match history_search.status {
            PromptHistorySearchStatus::Passing => "",
            PromptHistorySearchStatus::Failing => "?",
        };
        Cow::Owned(format!(
            "({}reverse-i-search '{}'): ",
            prefix, history_search.term
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn prompt_reflects_connection_state() {
        let mut prompt = ShellPrompt::new();
        assert_eq!(prompt.render_prompt_left(), "schemashell> ");
        assert_eq!(prompt.render_prompt_right(), "");

        prompt.update(Some("sa@books"), true);
        assert_eq!(prompt.render_prompt_left(), "schemashell sa@books> ");
        assert_eq!(prompt.render_prompt_right(), "[catalog loaded]");
    }
}
