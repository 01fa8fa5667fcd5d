use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum KeywordCase {
    #[default]
    Upper,
    Lower,
}

/// How a dialect restricts a statement to a row range.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PaginationSyntax {
    /// `LIMIT n OFFSET m`
    #[default]
    LimitOffset,
    /// `OFFSET m ROWS FETCH NEXT n ROWS ONLY`
    OffsetFetch,
    /// `SELECT TOP n ...`, switching to OFFSET/FETCH when an offset is needed.
    Top,
    /// Nested `ROWNUM` filters.
    RowNum,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BooleanLiteral {
    #[default]
    TrueFalse,
    OneZero,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BytesLiteral {
    /// `X'0aff'`
    #[default]
    HexString,
    /// `'\x0aff'`
    EscapedHex,
    /// `0x0aff`
    ZeroX,
}

/// Syntax rules that distinguish one engine's SQL from another's.
///
/// Dialects are plain data so engine drivers can ship them as configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Dialect {
    pub identifier_open: char,
    pub identifier_close: char,
    pub keyword_case: KeywordCase,
    pub pagination: PaginationSyntax,
    pub backslash_escapes: bool,
    pub boolean_literal: BooleanLiteral,
    pub bytes_literal: BytesLiteral,
}

impl Default for Dialect {
    fn default() -> Self {
        Self::mysql()
    }
}

impl Dialect {
    #[must_use]
    pub fn mysql() -> Self {
        Self {
            identifier_open: '`',
            identifier_close: '`',
            keyword_case: KeywordCase::Upper,
            pagination: PaginationSyntax::LimitOffset,
            backslash_escapes: true,
            boolean_literal: BooleanLiteral::OneZero,
            bytes_literal: BytesLiteral::HexString,
        }
    }

    #[must_use]
    pub fn postgres() -> Self {
        Self {
            identifier_open: '"',
            identifier_close: '"',
            backslash_escapes: false,
            boolean_literal: BooleanLiteral::TrueFalse,
            bytes_literal: BytesLiteral::EscapedHex,
            ..Self::mysql()
        }
    }

    #[must_use]
    pub fn sqlite() -> Self {
        Self {
            identifier_open: '"',
            identifier_close: '"',
            backslash_escapes: false,
            ..Self::mysql()
        }
    }

    #[must_use]
    pub fn mssql() -> Self {
        Self {
            identifier_open: '[',
            identifier_close: ']',
            pagination: PaginationSyntax::Top,
            backslash_escapes: false,
            bytes_literal: BytesLiteral::ZeroX,
            ..Self::mysql()
        }
    }

    #[must_use]
    pub fn oracle() -> Self {
        Self {
            identifier_open: '"',
            identifier_close: '"',
            pagination: PaginationSyntax::RowNum,
            backslash_escapes: false,
            ..Self::mysql()
        }
    }

    #[must_use]
    pub fn keyword(&self, keyword: &str) -> String {
        match self.keyword_case {
            KeywordCase::Upper => keyword.to_ascii_uppercase(),
            KeywordCase::Lower => keyword.to_ascii_lowercase(),
        }
    }

    #[must_use]
    pub fn quote_identifier(&self, identifier: &str) -> String {
        let close = self.identifier_close.to_string();
        let doubled = format!("{0}{0}", self.identifier_close);
        format!(
            "{}{}{}",
            self.identifier_open,
            identifier.replace(&close, &doubled),
            self.identifier_close
        )
    }

    #[must_use]
    pub fn quote_string(&self, value: &str) -> String {
        let mut quoted = String::with_capacity(value.len() + 2);
        quoted.push('\'');
        for ch in value.chars() {
            match ch {
                '\'' => quoted.push_str("''"),
                '\\' if self.backslash_escapes => quoted.push_str("\\\\"),
                _ => quoted.push(ch),
            }
        }
        quoted.push('\'');
        quoted
    }
}

#[cfg(test)]
mod tests {
    use super::{Dialect, KeywordCase};

    #[test]
    fn quotes_identifiers_with_dialect_characters() {
        assert_eq!(Dialect::mysql().quote_identifier("users"), "`users`");
        assert_eq!(Dialect::mysql().quote_identifier("odd`name"), "`odd``name`");
        assert_eq!(Dialect::postgres().quote_identifier("a\"b"), "\"a\"\"b\"");
        assert_eq!(Dialect::mssql().quote_identifier("x]y[z"), "[x]]y[z]");
    }

    #[test]
    fn string_escaping_follows_backslash_rule() {
        assert_eq!(Dialect::mysql().quote_string("a'b\\c"), "'a''b\\\\c'");
        assert_eq!(Dialect::postgres().quote_string("a'b\\c"), "'a''b\\c'");
    }

    #[test]
    fn keyword_case_is_configurable() {
        let mut dialect = Dialect::sqlite();
        assert_eq!(dialect.keyword("select"), "SELECT");

        dialect.keyword_case = KeywordCase::Lower;
        assert_eq!(dialect.keyword("SELECT"), "select");
    }

    #[test]
    fn partial_toml_definition_falls_back_to_defaults() {
        let dialect: Dialect = toml::from_str(
            r#"
identifier_open = "["
identifier_close = "]"
pagination = "top"
"#,
        )
        .expect("dialect should parse");

        assert_eq!(dialect.identifier_open, '[');
        assert_eq!(dialect.pagination, super::PaginationSyntax::Top);
        assert_eq!(dialect.keyword_case, KeywordCase::Upper);
    }
}
