use std::collections::BTreeMap;

use serde_json::Value;

use super::command_registry::{
    CommandSpec, EXPORT_COMMAND, MODE_COMMANDS, NO_ARG_COMMANDS, RAW_ARG_COMMANDS,
    SINGLE_ID_COMMANDS, SINGLE_PATH_COMMANDS,
};

#[derive(Debug, Clone, PartialEq)]
pub struct Intent {
    pub action: String,
    pub raw: String,
    pub prompt: Option<String>,
    pub command_args: BTreeMap<String, Value>,
}

impl Intent {
    fn new(action: &str, raw: &str) -> Self {
        Self {
            action: action.to_string(),
            raw: raw.to_string(),
            prompt: None,
            command_args: BTreeMap::new(),
        }
    }

    fn with_arg(mut self, key: &str, value: Value) -> Self {
        self.command_args.insert(key.to_string(), value);
        self
    }

    pub fn arg_str(&self, key: &str) -> Option<&str> {
        self.command_args
            .get(key)
            .and_then(Value::as_str)
            .map(str::trim)
            .filter(|value| !value.is_empty())
    }

    pub fn arg_strings(&self, key: &str) -> Vec<String> {
        self.command_args
            .get(key)
            .and_then(Value::as_array)
            .map(|rows| {
                rows.iter()
                    .filter_map(Value::as_str)
                    .map(str::to_string)
                    .collect()
            })
            .unwrap_or_default()
    }
}

fn find_action(command: &str, specs: &[CommandSpec]) -> Option<&'static str> {
    specs
        .iter()
        .find(|spec| spec.command == command)
        .map(|spec| spec.action)
}

fn split_args(arg: &str) -> Vec<String> {
    if arg.trim().is_empty() {
        return Vec::new();
    }
    match shell_words::split(arg) {
        Ok(parts) => parts
            .into_iter()
            .filter(|value| !value.is_empty())
            .collect(),
        Err(_) => arg
            .split_whitespace()
            .map(str::to_string)
            .filter(|value| !value.is_empty())
            .collect(),
    }
}

fn parse_single_arg(arg: &str) -> String {
    let parts = split_args(arg);
    match parts.len() {
        0 => String::new(),
        1 => parts[0].clone(),
        _ => parts.join(" "),
    }
}

/// Parses one line typed into the interactive session.
///
/// Slash commands switch modes or act on the history; any other non-empty
/// text is a prompt submitted in the current mode.
pub fn parse_intent(text: &str) -> Intent {
    let raw_trimmed = text.trim();
    if raw_trimmed.is_empty() {
        return Intent::new("noop", text);
    }

    if let Some(slash_tail) = raw_trimmed.strip_prefix('/') {
        let command_len = slash_tail
            .chars()
            .take_while(|ch| ch.is_ascii_alphanumeric() || *ch == '_')
            .count();
        if command_len > 0 {
            let command = slash_tail[..command_len].to_ascii_lowercase();
            let arg = slash_tail[command_len..].trim();

            if MODE_COMMANDS.iter().any(|mode| *mode == command) {
                return Intent::new("set_mode", text).with_arg("mode", Value::String(command));
            }

            if let Some(action) = find_action(&command, RAW_ARG_COMMANDS) {
                return Intent::new(action, text)
                    .with_arg("value", Value::String(arg.to_string()));
            }

            if let Some(action) = find_action(&command, SINGLE_PATH_COMMANDS) {
                return Intent::new(action, text)
                    .with_arg("path", Value::String(parse_single_arg(arg)));
            }

            if let Some(action) = find_action(&command, SINGLE_ID_COMMANDS) {
                return Intent::new(action, text)
                    .with_arg("id", Value::String(parse_single_arg(arg)));
            }

            if let Some(action) = find_action(&command, NO_ARG_COMMANDS) {
                return Intent::new(action, text);
            }

            if command == EXPORT_COMMAND.command {
                let mut parts = split_args(arg).into_iter();
                let out = parts.next().unwrap_or_default();
                let ids = parts.map(Value::String).collect();
                return Intent::new(EXPORT_COMMAND.action, text)
                    .with_arg("out", Value::String(out))
                    .with_arg("ids", Value::Array(ids));
            }

            return Intent::new("unknown", text)
                .with_arg("command", Value::String(command))
                .with_arg("arg", Value::String(arg.to_string()));
        }
    }

    let mut intent = Intent::new("submit", text);
    intent.prompt = Some(raw_trimmed.to_string());
    intent
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::parse_intent;

    #[test]
    fn blank_line_is_noop() {
        assert_eq!(parse_intent("   ").action, "noop");
    }

    #[test]
    fn plain_text_is_submitted_prompt() {
        let intent = parse_intent("  dancing in the rain ");
        assert_eq!(intent.action, "submit");
        assert_eq!(intent.prompt.as_deref(), Some("dancing in the rain"));
    }

    #[test]
    fn mode_commands_switch_modes() {
        for mode in ["generate", "remix", "history"] {
            let intent = parse_intent(&format!("/{}", mode.to_ascii_uppercase()));
            assert_eq!(intent.action, "set_mode");
            assert_eq!(intent.arg_str("mode"), Some(mode));
        }
    }

    #[test]
    fn ratio_keeps_raw_value() {
        let intent = parse_intent("/ratio 16:9");
        assert_eq!(intent.action, "set_aspect_ratio");
        assert_eq!(intent.arg_str("value"), Some("16:9"));
    }

    #[test]
    fn image_accepts_quoted_path() {
        let intent = parse_intent("/image \"/tmp/my photo.png\"");
        assert_eq!(intent.action, "set_input_image");
        assert_eq!(intent.command_args["path"], json!("/tmp/my photo.png"));
    }

    #[test]
    fn id_commands() {
        let reuse = parse_intent("/reuse img-1");
        assert_eq!(reuse.action, "reuse");
        assert_eq!(reuse.arg_str("id"), Some("img-1"));

        let delete = parse_intent("/delete");
        assert_eq!(delete.action, "delete");
        assert_eq!(delete.arg_str("id"), None);
    }

    #[test]
    fn export_splits_out_dir_and_ids() {
        let intent = parse_intent("/export \"/tmp/out dir\" img-1 img-2");
        assert_eq!(intent.action, "export");
        assert_eq!(intent.arg_str("out"), Some("/tmp/out dir"));
        assert_eq!(intent.arg_strings("ids"), vec!["img-1", "img-2"]);

        let all = parse_intent("/export out");
        assert!(all.arg_strings("ids").is_empty());
    }

    #[test]
    fn quit_aliases() {
        assert_eq!(parse_intent("/quit").action, "quit");
        assert_eq!(parse_intent("/exit").action, "quit");
        assert_eq!(parse_intent("/clear").action, "clear_history");
    }

    #[test]
    fn again_resubmits_form_prompt() {
        let intent = parse_intent("/again");
        assert_eq!(intent.action, "resubmit");
        assert_eq!(intent.prompt, None);
    }

    #[test]
    fn unknown_command() {
        let intent = parse_intent("/magic foo bar");
        assert_eq!(intent.action, "unknown");
        assert_eq!(intent.command_args["command"], json!("magic"));
        assert_eq!(intent.command_args["arg"], json!("foo bar"));
    }
}
