use std::str::FromStr;

use strum_macros::EnumString;

use crate::error::CommandError;
use crate::event::InputEvent;

/// Prefix given to the command parsed from a blank template.
pub const EMPTY_PREFIX: &str = "empty";

const PLACEHOLDER_OPEN: &str = "{{";
const PLACEHOLDER_CLOSE: &str = "}}";

/// A raw command split at its first `:`.
#[derive(Debug, Clone, Eq, PartialEq)]
pub struct Command {
    prefix: String,
    body: String,
}

impl Command {
    /// Parses a trimmed `prefix:body` template. A blank template yields the
    /// empty command.
    pub fn parse(raw: &str) -> Result<Self, CommandError> {
        let trimmed = raw.trim();
        if trimmed.is_empty() {
            return Ok(Self {
                prefix: EMPTY_PREFIX.to_string(),
                body: String::new(),
            });
        }

        let (prefix, body) =
            trimmed
                .split_once(':')
                .ok_or_else(|| CommandError::MissingSeparator {
                    command: trimmed.to_string(),
                })?;
        Ok(Self {
            prefix: prefix.to_string(),
            body: body.to_string(),
        })
    }

    #[must_use]
    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    #[must_use]
    pub fn body(&self) -> &str {
        &self.body
    }

    /// Returns whether this is the never-dispatched empty command.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.prefix == EMPTY_PREFIX && self.body.is_empty()
    }

    /// Substitutes `{{ key }}`, `{{ value }}` and `{{ raw }}` in the body.
    pub fn render(&self, event: &InputEvent) -> Result<String, CommandError> {
        render_template(&self.body, event)
    }
}

#[derive(Debug, Clone, Copy, Eq, PartialEq, EnumString)]
#[strum(serialize_all = "lowercase", ascii_case_insensitive)]
enum TemplateField {
    Key,
    Value,
    Raw,
}

fn render_template(body: &str, event: &InputEvent) -> Result<String, CommandError> {
    let mut rendered = String::with_capacity(body.len());
    let mut rest = body;

    while let Some(start) = rest.find(PLACEHOLDER_OPEN) {
        rendered.push_str(&rest[..start]);
        let inner = &rest[start + PLACEHOLDER_OPEN.len()..];
        let end = inner
            .find(PLACEHOLDER_CLOSE)
            .ok_or_else(|| CommandError::UnterminatedPlaceholder {
                body: body.to_string(),
            })?;

        let name = inner[..end].trim();
        let name = name.strip_prefix('.').unwrap_or(name);
        let field = TemplateField::from_str(name).map_err(|_| CommandError::UnknownField {
            field: name.to_string(),
        })?;
        match field {
            TemplateField::Key => rendered.push_str(event.key().as_ref()),
            TemplateField::Value => rendered.push_str(&event.value().to_string()),
            TemplateField::Raw => rendered.push_str(&hex::encode(event.raw())),
        }

        rest = &inner[end + PLACEHOLDER_CLOSE.len()..];
    }

    rendered.push_str(rest);
    Ok(rendered)
}

#[cfg(test)]
mod tests {
    use assert_matches::assert_matches;
    use pretty_assertions::assert_eq;
    use rstest::rstest;

    use super::*;
    use crate::event::EventKey;

    fn rotate_event() -> InputEvent {
        InputEvent::new(EventKey::Rotate, 300, &[0x2C, 0x01])
    }

    #[rstest]
    #[case("fhem:set lamp on", "fhem", "set lamp on")]
    #[case("  nuimo:bulb\n", "nuimo", "bulb")]
    #[case("fhem:get lamp state:on", "fhem", "get lamp state:on")]
    #[case("", EMPTY_PREFIX, "")]
    #[case("   ", EMPTY_PREFIX, "")]
    fn parse_splits_at_first_colon(
        #[case] raw: &str,
        #[case] prefix: &str,
        #[case] body: &str,
    ) {
        let command = Command::parse(raw).expect("command should parse");
        assert_eq!((prefix, body), (command.prefix(), command.body()));
    }

    #[test]
    fn parse_rejects_commands_without_prefix() {
        let error = Command::parse("set lamp on").expect_err("missing colon should fail");
        assert_eq!(
            CommandError::MissingSeparator {
                command: "set lamp on".to_string()
            },
            error
        );
    }

    #[test]
    fn only_blank_templates_are_empty() {
        assert!(Command::parse("").expect("blank parses").is_empty());
        assert!(!Command::parse("empty:x").expect("command parses").is_empty());
    }

    #[rstest]
    #[case("set amp volume {{ value }}", "set amp volume 300")]
    #[case("set amp {{.Value}}", "set amp 300")]
    #[case("log {{KEY}} {{ raw }}", "log rotate 2c01")]
    #[case("no placeholders", "no placeholders")]
    #[case("{{value}}{{value}}", "300300")]
    fn render_substitutes_event_fields(#[case] body: &str, #[case] expected: &str) {
        let command = Command::parse(&format!("fhem:{body}")).expect("command should parse");
        assert_eq!(
            expected,
            command.render(&rotate_event()).expect("template should render")
        );
    }

    #[test]
    fn render_rejects_unknown_fields() {
        let command = Command::parse("fhem:set {{ .Scene }}").expect("command should parse");
        assert_matches!(
            command.render(&rotate_event()),
            Err(CommandError::UnknownField { field }) if field == "Scene"
        );
    }

    #[test]
    fn render_rejects_unterminated_placeholders() {
        let command = Command::parse("fhem:set {{ value").expect("command should parse");
        assert_matches!(
            command.render(&rotate_event()),
            Err(CommandError::UnterminatedPlaceholder { .. })
        );
    }
}
