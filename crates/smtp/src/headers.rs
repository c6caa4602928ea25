//! Parsing of the RFC 822 header section of a received message.
//!
//! Folded fields (continuation lines starting with whitespace) are unfolded
//! before a field is interpreted. Only the handful of fields the mailbox
//! cares about are extracted; everything else is skipped. Parsing stops at
//! the blank line separating headers from body.

use crate::command;

/// Structured metadata lifted out of a message's header section.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct HeaderSection {
    /// Address inside the `From` header's angle brackets.
    pub from: String,
    /// `To` header entries, split on commas, in header order.
    pub to: Vec<String>,
    pub subject: String,
    /// `Message-ID` value, angle brackets included.
    pub message_id: String,
    pub date: String,
}

#[derive(Debug, PartialEq, Eq, thiserror::Error)]
pub enum ParseError {
    #[error("malformed header field {0:?}")]
    MalformedField(String),
    #[error("From header carries no angle-bracket address")]
    InvalidFrom,
    #[error("Message-ID is not wrapped in angle brackets")]
    InvalidMessageId,
    #[error("header section has no From address")]
    MissingFrom,
    #[error("header section has no Message-ID")]
    MissingMessageId,
}

/// Parse the header section at the start of `data`.
///
/// # Errors
///
/// Fails on any field that does not match `name: value`, on a `From` or
/// `Message-ID` field violating its address grammar, and on a section
/// missing either of those two required fields.
pub fn parse_header_section(data: &str) -> Result<HeaderSection, ParseError> {
    let mut section = HeaderSection::default();
    let mut field = String::new();

    for line in data.lines() {
        if field.is_empty() || is_continuation(line) {
            field.truncate(field.trim_end().len());
            field.push_str(line);
            continue;
        }

        parse_field(field.trim(), &mut section)?;
        field = line.to_owned();

        if line.trim().is_empty() {
            break;
        }
    }

    if section.from.is_empty() {
        return Err(ParseError::MissingFrom);
    }
    if section.message_id.is_empty() {
        return Err(ParseError::MissingMessageId);
    }

    Ok(section)
}

fn is_continuation(line: &str) -> bool {
    line.starts_with([' ', '\t']) && !line.trim().is_empty()
}

fn parse_field(field: &str, section: &mut HeaderSection) -> Result<(), ParseError> {
    let Some((name, value)) = field.split_once(": ") else {
        return Err(ParseError::MalformedField(field.to_owned()));
    };

    if name.is_empty() || value.is_empty() {
        return Err(ParseError::MalformedField(field.to_owned()));
    }

    match name.to_ascii_lowercase().as_str() {
        "from" => {
            section.from = command::mailbox(value)
                .ok_or(ParseError::InvalidFrom)?
                .to_string();
        }
        "to" => {
            section.to = value.split(',').map(|addr| addr.trim().to_owned()).collect();
        }
        "subject" => section.subject = value.to_owned(),
        "message-id" => {
            let wrapped = value.len() > 2 && value.starts_with('<') && value.ends_with('>');
            if !wrapped {
                return Err(ParseError::InvalidMessageId);
            }
            section.message_id = value.to_owned();
        }
        "date" => section.date = value.to_owned(),
        _ => {}
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::{parse_header_section, ParseError};

    #[test]
    fn parses_a_typical_message() {
        let section = parse_header_section(
            "From: \"Aya the Narwhal\" <aya@kuvert.email>\r\n\
             To: alice@example.com, bob@example.com\r\n\
             Subject: quarterly numbers\r\n\
             Message-ID: <d1a0cd3b@kuvert.email>\r\n\
             Date: Thu, 6 Aug 2026 09:00:00 +0000\r\n\
             \r\n\
             The numbers are in.\r\n",
        )
        .unwrap();

        assert_eq!(section.from, "aya@kuvert.email");
        assert_eq!(section.to, ["alice@example.com", "bob@example.com"]);
        assert_eq!(section.subject, "quarterly numbers");
        assert_eq!(section.message_id, "<d1a0cd3b@kuvert.email>");
        assert_eq!(section.date, "Thu, 6 Aug 2026 09:00:00 +0000");
    }

    #[test]
    fn unfolds_continuation_lines() {
        let section = parse_header_section(
            "From: <aya@kuvert.email>\r\n\
             Subject: a subject\r\n \
             split across lines\r\n\
             Message-ID: <folded@kuvert.email>\r\n\
             \r\n",
        )
        .unwrap();

        assert_eq!(section.subject, "a subject split across lines");
    }

    #[test]
    fn ignores_unrecognized_fields() {
        let section = parse_header_section(
            "From: <aya@kuvert.email>\r\n\
             X-Mailer: kuvert-test\r\n\
             Message-ID: <x@kuvert.email>\r\n\
             \r\n",
        )
        .unwrap();

        assert_eq!(section.from, "aya@kuvert.email");
        assert!(section.subject.is_empty());
    }

    #[test]
    fn stops_at_the_blank_line() {
        let section = parse_header_section(
            "From: <aya@kuvert.email>\r\n\
             Message-ID: <x@kuvert.email>\r\n\
             \r\n\
             not-a-header and certainly not name colon value\r\n",
        )
        .unwrap();

        assert_eq!(section.message_id, "<x@kuvert.email>");
    }

    #[test]
    fn rejects_a_malformed_field() {
        let err = parse_header_section(
            "From: <aya@kuvert.email>\r\n\
             this line has no colon\r\n\
             \r\n",
        )
        .unwrap_err();

        assert_eq!(
            err,
            ParseError::MalformedField("this line has no colon".to_owned())
        );
    }

    #[test]
    fn rejects_from_without_angle_address() {
        assert_eq!(
            parse_header_section("From: aya@kuvert.email\r\n\r\n").unwrap_err(),
            ParseError::InvalidFrom
        );
    }

    #[test]
    fn rejects_unwrapped_message_id() {
        let err = parse_header_section(
            "From: <aya@kuvert.email>\r\n\
             Message-ID: d1a0cd3b@kuvert.email\r\n\
             \r\n",
        )
        .unwrap_err();

        assert_eq!(err, ParseError::InvalidMessageId);
    }

    #[test]
    fn requires_from_and_message_id() {
        assert_eq!(
            parse_header_section("Subject: hi\r\nMessage-ID: <x@y.z>\r\n\r\n").unwrap_err(),
            ParseError::MissingFrom
        );
        assert_eq!(
            parse_header_section("From: <aya@kuvert.email>\r\nSubject: hi\r\n\r\n").unwrap_err(),
            ParseError::MissingMessageId
        );
    }
}
