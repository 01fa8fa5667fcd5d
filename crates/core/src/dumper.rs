use std::fmt::Write as _;

use thiserror::Error;

use crate::dialect::{BooleanLiteral, BytesLiteral, Dialect};
use crate::query_model::{SqlValue, TableName};

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum DumpError {
    #[error("identifier cannot be empty")]
    EmptyIdentifier,
    #[error("template `{template}` expects {expected} for token {position}")]
    TemplateArgument {
        template: String,
        expected: &'static str,
        position: usize,
    },
    #[error("template `{template}` received {unused} unused argument(s)")]
    UnusedTemplateArguments { template: String, unused: usize },
    #[error("template `{template}` contains unknown token `%{token}`")]
    UnknownTemplateToken { template: String, token: char },
}

/// Argument consumed by one `%` token of [`SqlDumper::put_template`].
#[derive(Debug, Clone, Copy)]
pub enum TemplateArg<'a> {
    Identifier(&'a str),
    Identifiers(&'a [String]),
    Table(&'a TableName),
    Value(&'a SqlValue),
    Values(&'a [SqlValue]),
    Raw(&'a str),
}

/// Text accumulator for one SQL statement (or a short script).
///
/// A dumper is created per translation and consumed by [`SqlDumper::finish`].
/// Output is append-only; a caller that abandons a translation halfway drops
/// the whole dumper.
#[derive(Debug, Clone)]
pub struct SqlDumper {
    dialect: Dialect,
    s: String,
    commands: usize,
    command_pending_separator: bool,
}

impl SqlDumper {
    #[must_use]
    pub fn new(dialect: Dialect) -> Self {
        Self {
            dialect,
            s: String::new(),
            commands: 0,
            command_pending_separator: false,
        }
    }

    #[must_use]
    pub fn dialect(&self) -> &Dialect {
        &self.dialect
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.s
    }

    #[must_use]
    pub fn command_count(&self) -> usize {
        self.commands
    }

    #[must_use]
    pub fn finish(self) -> String {
        self.s
    }

    pub fn put_raw(&mut self, text: &str) {
        if self.command_pending_separator {
            self.command_pending_separator = false;
            self.s.push('\n');
        }
        self.s.push_str(text);
    }

    pub fn put_keyword(&mut self, keyword: &str) {
        let rendered = self.dialect.keyword(keyword);
        self.put_raw(&rendered);
    }

    /// Emits a quoted identifier. Blank names are rejected and nothing is
    /// written.
    pub fn put_identifier(&mut self, name: &str) -> Result<(), DumpError> {
        if name.trim().is_empty() {
            return Err(DumpError::EmptyIdentifier);
        }
        let quoted = self.dialect.quote_identifier(name);
        self.put_raw(&quoted);
        Ok(())
    }

    pub fn put_table_name(&mut self, table: &TableName) -> Result<(), DumpError> {
        if table.pure_name.trim().is_empty() {
            return Err(DumpError::EmptyIdentifier);
        }
        if let Some(schema) = table.qualifying_schema() {
            self.put_identifier(schema)?;
            self.put_raw(".");
        }
        self.put_identifier(&table.pure_name)
    }

    pub fn put_value(&mut self, value: &SqlValue) {
        match value {
            SqlValue::Null => self.put_keyword("null"),
            SqlValue::Bool(flag) => match (self.dialect.boolean_literal, flag) {
                (BooleanLiteral::TrueFalse, true) => self.put_keyword("true"),
                (BooleanLiteral::TrueFalse, false) => self.put_keyword("false"),
                (BooleanLiteral::OneZero, true) => self.put_raw("1"),
                (BooleanLiteral::OneZero, false) => self.put_raw("0"),
            },
            SqlValue::Int(number) => self.put_raw(&number.to_string()),
            SqlValue::Float(number) if number.is_finite() => self.put_raw(&number.to_string()),
            SqlValue::Float(_) => self.put_keyword("null"),
            SqlValue::Text(text) => {
                let quoted = self.dialect.quote_string(text);
                self.put_raw(&quoted);
            }
            SqlValue::Bytes(bytes) => {
                let literal = bytes_literal(self.dialect.bytes_literal, bytes);
                self.put_raw(&literal);
            }
        }
    }

    /// Writes a template. `^word` renders a keyword in dialect casing; `%i`,
    /// `%f`, `%v`, `%s`, `%,i` and `%,v` consume one argument each; `%%` is a
    /// literal percent sign.
    pub fn put_template(
        &mut self,
        template: &str,
        args: &[TemplateArg<'_>],
    ) -> Result<(), DumpError> {
        let mut args = args.iter();
        let mut position = 0;
        let mut chars = template.chars().peekable();

        while let Some(ch) = chars.next() {
            match ch {
                '^' => {
                    let mut keyword = String::new();
                    while let Some(next) = chars.next_if(char::is_ascii_alphabetic) {
                        keyword.push(next);
                    }
                    if keyword.is_empty() {
                        self.put_raw("^");
                    } else {
                        self.put_keyword(&keyword);
                    }
                }
                '%' => {
                    let Some(token) = chars.next() else {
                        return Err(DumpError::UnknownTemplateToken {
                            template: template.to_string(),
                            token: '%',
                        });
                    };
                    if token == '%' {
                        self.put_raw("%");
                        continue;
                    }
                    let (list, token) = if token == ',' {
                        (true, chars.next().unwrap_or(','))
                    } else {
                        (false, token)
                    };
                    position += 1;
                    let arg = args.next();
                    self.put_template_arg(template, position, list, token, arg)?;
                }
                _ => {
                    let mut buffer = [0_u8; 4];
                    self.put_raw(ch.encode_utf8(&mut buffer));
                }
            }
        }

        let unused = args.count();
        if unused > 0 {
            return Err(DumpError::UnusedTemplateArguments {
                template: template.to_string(),
                unused,
            });
        }
        Ok(())
    }

    /// Writes a template and closes it as one command.
    pub fn put_command(
        &mut self,
        template: &str,
        args: &[TemplateArg<'_>],
    ) -> Result<(), DumpError> {
        self.put_template(template, args)?;
        self.end_command();
        Ok(())
    }

    /// Terminates the current command. The next emitted text starts on a new
    /// line.
    pub fn end_command(&mut self) {
        self.put_raw(";");
        self.commands += 1;
        self.command_pending_separator = true;
    }

    fn put_template_arg(
        &mut self,
        template: &str,
        position: usize,
        list: bool,
        token: char,
        arg: Option<&TemplateArg<'_>>,
    ) -> Result<(), DumpError> {
        let mismatch = |expected: &'static str| DumpError::TemplateArgument {
            template: template.to_string(),
            expected,
            position,
        };

        match (list, token, arg) {
            (false, 'i', Some(TemplateArg::Identifier(name))) => self.put_identifier(name),
            (false, 'i', _) => Err(mismatch("an identifier")),
            (false, 'f', Some(TemplateArg::Table(table))) => self.put_table_name(table),
            (false, 'f', _) => Err(mismatch("a table name")),
            (false, 'v', Some(TemplateArg::Value(value))) => {
                self.put_value(value);
                Ok(())
            }
            (false, 'v', _) => Err(mismatch("a value")),
            (false, 's', Some(TemplateArg::Raw(text))) => {
                self.put_raw(text);
                Ok(())
            }
            (false, 's', _) => Err(mismatch("raw text")),
            (true, 'i', Some(TemplateArg::Identifiers(names))) => {
                for (index, name) in names.iter().enumerate() {
                    if index > 0 {
                        self.put_raw(", ");
                    }
                    self.put_identifier(name)?;
                }
                Ok(())
            }
            (true, 'i', _) => Err(mismatch("an identifier list")),
            (true, 'v', Some(TemplateArg::Values(values))) => {
                for (index, value) in values.iter().enumerate() {
                    if index > 0 {
                        self.put_raw(", ");
                    }
                    self.put_value(value);
                }
                Ok(())
            }
            (true, 'v', _) => Err(mismatch("a value list")),
            (_, token, _) => Err(DumpError::UnknownTemplateToken {
                template: template.to_string(),
                token,
            }),
        }
    }
}

fn bytes_literal(style: BytesLiteral, bytes: &[u8]) -> String {
    let mut hex = String::with_capacity(bytes.len() * 2);
    for byte in bytes {
        let _ = write!(hex, "{byte:02x}");
    }
    match style {
        BytesLiteral::HexString => format!("X'{hex}'"),
        BytesLiteral::EscapedHex => format!("'\\x{hex}'"),
        BytesLiteral::ZeroX => format!("0x{hex}"),
    }
}

#[cfg(test)]
mod tests {
    use super::{DumpError, SqlDumper, TemplateArg};
    use crate::dialect::{Dialect, KeywordCase};
    use crate::query_model::{SqlValue, TableName};

    #[test]
    fn rejects_blank_identifiers_without_emitting() {
        let mut dumper = SqlDumper::new(Dialect::mysql());
        assert_eq!(dumper.put_identifier(""), Err(DumpError::EmptyIdentifier));
        assert_eq!(dumper.put_identifier(" \t"), Err(DumpError::EmptyIdentifier));
        assert_eq!(dumper.finish(), "");
    }

    #[test]
    fn table_names_are_schema_qualified_only_when_schema_is_set() {
        let mut dumper = SqlDumper::new(Dialect::postgres());
        dumper
            .put_table_name(&TableName::new("users").with_schema("public"))
            .expect("qualified table");
        dumper.put_raw(" ");
        dumper
            .put_table_name(&TableName::new("users").with_schema(""))
            .expect("bare table");
        assert_eq!(dumper.finish(), "\"public\".\"users\" \"users\"");
    }

    #[test]
    fn values_render_per_dialect() {
        let mut mysql = SqlDumper::new(Dialect::mysql());
        for value in [
            SqlValue::Null,
            SqlValue::Bool(true),
            SqlValue::Int(-4),
            SqlValue::Float(f64::NAN),
            SqlValue::Text("it's".to_string()),
            SqlValue::Bytes(vec![0x0a, 0xff]),
        ] {
            mysql.put_value(&value);
            mysql.put_raw(" ");
        }
        assert_eq!(mysql.finish(), "NULL 1 -4 NULL 'it''s' X'0aff' ");

        let mut postgres = SqlDumper::new(Dialect::postgres());
        postgres.put_value(&SqlValue::Bool(false));
        postgres.put_raw(" ");
        postgres.put_value(&SqlValue::Bytes(vec![1]));
        assert_eq!(postgres.finish(), "FALSE '\\x01'");
    }

    #[test]
    fn template_renders_keywords_and_placeholders() {
        let mut dialect = Dialect::mysql();
        dialect.keyword_case = KeywordCase::Lower;
        let mut dumper = SqlDumper::new(dialect);
        let columns = vec!["id".to_string(), "name".to_string()];
        let values = vec![SqlValue::Int(1), SqlValue::Text("a".to_string())];
        let table = TableName::new("users").with_schema("app");

        dumper
            .put_command(
                "^INSERT ^into %f (%,i) ^values (%,v)",
                &[
                    TemplateArg::Table(&table),
                    TemplateArg::Identifiers(&columns),
                    TemplateArg::Values(&values),
                ],
            )
            .expect("template should render");
        dumper
            .put_command(
                "^delete ^from %i ^where %i = %v",
                &[
                    TemplateArg::Identifier("users"),
                    TemplateArg::Identifier("id"),
                    TemplateArg::Value(&SqlValue::Int(2)),
                ],
            )
            .expect("second command");

        assert_eq!(dumper.command_count(), 2);
        assert_eq!(
            dumper.finish(),
            "insert into `app`.`users` (`id`, `name`) values (1, 'a');\n\
             delete from `users` where `id` = 2;"
        );
    }

    #[test]
    fn template_reports_argument_mismatches() {
        let mut dumper = SqlDumper::new(Dialect::mysql());
        let err = dumper
            .put_template("%i", &[TemplateArg::Raw("x")])
            .expect_err("raw text is not an identifier");
        assert!(matches!(err, DumpError::TemplateArgument { position: 1, .. }));

        let err = dumper
            .put_template("%s", &[TemplateArg::Raw("a"), TemplateArg::Raw("b")])
            .expect_err("extra argument");
        assert!(matches!(err, DumpError::UnusedTemplateArguments { unused: 1, .. }));

        let err = dumper
            .put_template("%q", &[TemplateArg::Raw("a")])
            .expect_err("unknown token");
        assert!(matches!(err, DumpError::UnknownTemplateToken { token: 'q', .. }));
    }

    #[test]
    fn literal_percent_and_caret_pass_through() {
        let mut dumper = SqlDumper::new(Dialect::mysql());
        dumper
            .put_template("100%% ^ %s", &[TemplateArg::Raw("done")])
            .expect("template should render");
        assert_eq!(dumper.finish(), "100% ^ done");
    }
}
