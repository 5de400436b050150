//! Rich text values exchanged with command handlers.
//!
//! Text may carry legacy `&`-prefixed formatting codes (`&a` green,
//! `&l` bold, `&r` reset, ...). The plain rendering strips them.

use std::fmt;

use mlua::{MetaMethod, UserData, UserDataFields, UserDataMethods};

/// Character introducing a formatting code.
pub const FORMAT_PREFIX: char = '&';

/// Host rich-text value.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Text {
    /// Source text including formatting codes.
    raw: String,
    /// Text with formatting codes removed.
    plain: String,
}

impl Text {
    /// Plain text with no formatting.
    pub fn of(content: impl Into<String>) -> Self {
        let content = content.into();
        Self {
            plain: content.clone(),
            raw: content,
        }
    }

    /// Parse text containing `&x` formatting codes.
    pub fn from_formatting_codes(source: &str) -> Self {
        let mut plain = String::with_capacity(source.len());
        let mut chars = source.chars().peekable();

        while let Some(c) = chars.next() {
            if c == FORMAT_PREFIX {
                if let Some(&code) = chars.peek() {
                    if is_format_code(code) {
                        chars.next();
                        continue;
                    }
                }
            }
            plain.push(c);
        }

        Self {
            raw: source.to_string(),
            plain,
        }
    }

    /// Text without formatting codes.
    pub fn plain(&self) -> &str {
        &self.plain
    }

    /// Text as written, formatting codes included.
    pub fn raw(&self) -> &str {
        &self.raw
    }

    /// Whether the text has no visible content.
    pub fn is_empty(&self) -> bool {
        self.plain.is_empty()
    }
}

fn is_format_code(c: char) -> bool {
    matches!(c.to_ascii_lowercase(), '0'..='9' | 'a'..='f' | 'k'..='o' | 'r')
}

impl fmt::Display for Text {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.plain)
    }
}

impl From<&str> for Text {
    fn from(s: &str) -> Self {
        Text::of(s)
    }
}

impl From<String> for Text {
    fn from(s: String) -> Self {
        Text::of(s)
    }
}

impl UserData for Text {
    fn add_fields<F: UserDataFields<Self>>(fields: &mut F) {
        fields.add_field_method_get("plain", |_, this| Ok(this.plain.clone()));
        fields.add_field_method_get("raw", |_, this| Ok(this.raw.clone()));
    }

    fn add_methods<M: UserDataMethods<Self>>(methods: &mut M) {
        methods.add_meta_method(MetaMethod::ToString, |_, this, ()| Ok(this.plain.clone()));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_text_of_is_verbatim() {
        let text = Text::of("&aHello");
        assert_eq!(text.plain(), "&aHello");
        assert_eq!(text.raw(), "&aHello");
    }

    #[test]
    fn test_formatting_codes_stripped() {
        let text = Text::from_formatting_codes("&aHello &l&eWorld&r!");
        assert_eq!(text.plain(), "Hello World!");
        assert_eq!(text.raw(), "&aHello &l&eWorld&r!");
    }

    #[test]
    fn test_unknown_code_is_kept() {
        let text = Text::from_formatting_codes("fish & chips &z");
        assert_eq!(text.plain(), "fish & chips &z");
    }

    #[test]
    fn test_trailing_prefix_is_kept() {
        let text = Text::from_formatting_codes("100&");
        assert_eq!(text.plain(), "100&");
    }

    #[test]
    fn test_display_uses_plain() {
        let text = Text::from_formatting_codes("&cDanger");
        assert_eq!(text.to_string(), "Danger");
    }

    #[test]
    fn test_text_userdata_fields() {
        let lua = mlua::Lua::new();
        lua.globals()
            .set("t", Text::from_formatting_codes("&bhi"))
            .unwrap();
        let plain: String = lua.load("return t.plain").eval().unwrap();
        let shown: String = lua.load("return tostring(t)").eval().unwrap();
        assert_eq!(plain, "hi");
        assert_eq!(shown, "hi");
    }
}
