//! Flat-text encoding of one day's expenses.
//!
//! A shard is CSV with a fixed header. Rows are ordered by `date` then `id`
//! so that the same set of expenses always produces byte-identical text,
//! which is what lets content hashes stand in for "unchanged".

use std::iter::Peekable;
use std::str::Chars;

use crate::models::{Expense, SyncedSettings};
use crate::util::{format_millis_rfc3339, parse_rfc3339_millis};
use crate::{Error, Result};

const COLUMNS: [&str; 8] = [
    "id",
    "amount",
    "category",
    "date",
    "note",
    "payment_method",
    "created_at",
    "updated_at",
];

/// Serialize a day's expenses into shard text.
pub fn encode_day(records: &[Expense]) -> Result<String> {
    let mut ordered: Vec<&Expense> = records.iter().collect();
    ordered.sort_by(|a, b| a.date.cmp(&b.date).then_with(|| a.id.cmp(&b.id)));

    let mut out = COLUMNS.join(",");
    out.push('\n');

    for record in ordered {
        let fields = [
            record.id.to_string(),
            record.amount.to_string(),
            record.category.clone(),
            format_millis_rfc3339(record.date)?,
            record.note.clone().unwrap_or_default(),
            record
                .payment_method
                .as_ref()
                .map(ToString::to_string)
                .unwrap_or_default(),
            format_millis_rfc3339(record.created_at)?,
            format_millis_rfc3339(record.updated_at)?,
        ];
        let row = fields
            .iter()
            .map(|field| escape_field(field))
            .collect::<Vec<_>>()
            .join(",");
        out.push_str(&row);
        out.push('\n');
    }

    Ok(out)
}

/// Parse shard text back into expenses.
pub fn decode_day(content: &str) -> Result<Vec<Expense>> {
    let content = content.strip_prefix('\u{feff}').unwrap_or(content);
    let mut rows = parse_rows(content)?.into_iter();

    let Some((line, header)) = rows.next() else {
        return Ok(Vec::new());
    };
    let header_matches = header.len() == COLUMNS.len()
        && header
            .iter()
            .zip(COLUMNS)
            .all(|(actual, expected)| actual.trim() == expected);
    if !header_matches {
        return Err(Error::codec(
            line,
            format!("unexpected header, expected '{}'", COLUMNS.join(",")),
        ));
    }

    rows.map(|(line, fields)| decode_row(line, fields)).collect()
}

/// Serialize the synced settings payload.
pub fn encode_settings(settings: &SyncedSettings) -> Result<String> {
    let mut out = serde_json::to_string_pretty(settings)?;
    out.push('\n');
    Ok(out)
}

/// Parse the synced settings payload.
pub fn decode_settings(content: &str) -> Result<SyncedSettings> {
    Ok(serde_json::from_str(content)?)
}

fn decode_row(line: usize, fields: Vec<String>) -> Result<Expense> {
    let [id, amount, category, date, note, payment_method, created_at, updated_at]: [String; 8] =
        fields.try_into().map_err(|fields: Vec<String>| {
            Error::codec(
                line,
                format!("expected {} fields, found {}", COLUMNS.len(), fields.len()),
            )
        })?;
    let at_line = |error: Error| Error::codec(line, error.to_string());

    Ok(Expense {
        id: id.parse().map_err(at_line)?,
        amount: amount.parse().map_err(at_line)?,
        category,
        date: parse_rfc3339_millis(&date).map_err(at_line)?,
        note: Some(note).filter(|note| !note.is_empty()),
        payment_method: if payment_method.trim().is_empty() {
            None
        } else {
            Some(payment_method.parse().map_err(at_line)?)
        },
        created_at: parse_rfc3339_millis(&created_at).map_err(at_line)?,
        updated_at: parse_rfc3339_millis(&updated_at).map_err(at_line)?,
    })
}

fn escape_field(field: &str) -> String {
    if field.contains([',', '"', '\r', '\n']) {
        format!("\"{}\"", field.replace('"', "\"\""))
    } else {
        field.to_string()
    }
}

/// Split CSV text into rows of fields, tagging each row with its first line.
fn parse_rows(content: &str) -> Result<Vec<(usize, Vec<String>)>> {
    let mut reader = RowReader {
        chars: content.chars().peekable(),
        line: 1,
    };
    let mut rows = Vec::new();

    while let Some((line, fields)) = reader.next_row()? {
        let blank = fields.len() == 1 && fields[0].is_empty();
        if !blank {
            rows.push((line, fields));
        }
    }

    Ok(rows)
}

struct RowReader<'a> {
    chars: Peekable<Chars<'a>>,
    line: usize,
}

impl RowReader<'_> {
    fn next_row(&mut self) -> Result<Option<(usize, Vec<String>)>> {
        if self.chars.peek().is_none() {
            return Ok(None);
        }

        let start = self.line;
        let mut fields = Vec::new();
        let mut field = String::new();
        let mut quoted = false;
        let mut in_quotes = false;

        while let Some(ch) = self.chars.next() {
            if in_quotes {
                match ch {
                    '"' if self.chars.peek() == Some(&'"') => {
                        self.chars.next();
                        field.push('"');
                    }
                    '"' => in_quotes = false,
                    '\n' => {
                        self.line += 1;
                        field.push(ch);
                    }
                    _ => field.push(ch),
                }
                continue;
            }

            match ch {
                '"' if field.is_empty() && !quoted => {
                    quoted = true;
                    in_quotes = true;
                }
                '"' => return Err(Error::codec(self.line, "unexpected quote in field")),
                ',' => {
                    fields.push(std::mem::take(&mut field));
                    quoted = false;
                }
                '\r' if self.chars.peek() == Some(&'\n') => {}
                '\n' => {
                    self.line += 1;
                    fields.push(field);
                    return Ok(Some((start, fields)));
                }
                _ if quoted => {
                    return Err(Error::codec(self.line, "text after closing quote"));
                }
                _ => field.push(ch),
            }
        }

        if in_quotes {
            return Err(Error::codec(start, "unterminated quoted field"));
        }
        fields.push(field);
        Ok(Some((start, fields)))
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;
    use crate::models::{Amount, ExpenseId, PaymentKind, PaymentMethod};

    fn expense(id: &str, date: i64) -> Expense {
        Expense {
            id: id.parse::<ExpenseId>().unwrap(),
            amount: Amount::from_minor_units(1250),
            category: "Food".to_string(),
            date,
            note: None,
            payment_method: None,
            created_at: date,
            updated_at: date + 5,
        }
    }

    #[test]
    fn encode_orders_rows_by_date_then_id() {
        let records = vec![
            expense("b", 2_000),
            expense("c", 1_000),
            expense("a", 2_000),
        ];
        let encoded = encode_day(&records).unwrap();
        let ids: Vec<&str> = encoded
            .lines()
            .skip(1)
            .map(|line| line.split(',').next().unwrap())
            .collect();
        assert_eq!(ids, vec!["c", "a", "b"]);
    }

    #[test]
    fn encode_is_independent_of_input_order() {
        let forward = vec![expense("a", 1_000), expense("b", 2_000)];
        let backward = vec![expense("b", 2_000), expense("a", 1_000)];
        assert_eq!(encode_day(&forward).unwrap(), encode_day(&backward).unwrap());
    }

    #[test]
    fn decode_restores_quoted_note_and_payment_method() {
        let mut record = expense("x1", 1_700_000_000_000);
        record.note = Some("dinner, \"the usual\"\nsplit with Sam".to_string());
        record.payment_method = Some(PaymentMethod {
            kind: PaymentKind::Card,
            label: Some("Visa".to_string()),
        });

        let encoded = encode_day(std::slice::from_ref(&record)).unwrap();
        assert!(encoded.contains("\"dinner, \"\"the usual\"\"\nsplit with Sam\""));

        let decoded = decode_day(&encoded).unwrap();
        assert_eq!(decoded, vec![record]);
    }

    #[test]
    fn decode_header_only_is_empty() {
        let encoded = encode_day(&[]).unwrap();
        assert_eq!(
            encoded,
            "id,amount,category,date,note,payment_method,created_at,updated_at\n"
        );
        assert!(decode_day(&encoded).unwrap().is_empty());
        assert!(decode_day("").unwrap().is_empty());
    }

    #[test]
    fn decode_accepts_crlf_bom_and_trailing_blank_lines() {
        let content = "\u{feff}id,amount,category,date,note,payment_method,created_at,updated_at\r\n\
                       e1,3.5,Transport,2024-03-01T08:00:00.000Z,,cash,2024-03-01T08:00:00.000Z,2024-03-01T08:00:00.000Z\r\n\r\n\n";
        let decoded = decode_day(content).unwrap();
        assert_eq!(decoded.len(), 1);
        assert_eq!(decoded[0].amount, Amount::from_minor_units(350));
        assert_eq!(decoded[0].note, None);
        assert_eq!(
            decoded[0].payment_method.as_ref().map(|method| method.kind),
            Some(PaymentKind::Cash)
        );
    }

    #[test]
    fn decode_reports_line_of_bad_row() {
        let content = "id,amount,category,date,note,payment_method,created_at,updated_at\n\
                       e1,1.00,Food,2024-03-01T08:00:00.000Z,,,2024-03-01T08:00:00.000Z,2024-03-01T08:00:00.000Z\n\
                       e2,lots,Food,2024-03-01T08:00:00.000Z,,,2024-03-01T08:00:00.000Z,2024-03-01T08:00:00.000Z\n";
        match decode_day(content).unwrap_err() {
            Error::Codec { line, message } => {
                assert_eq!(line, 3);
                assert!(message.contains("lots"));
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn decode_rejects_wrong_header_and_field_count() {
        assert!(matches!(
            decode_day("id,amount\n"),
            Err(Error::Codec { line: 1, .. })
        ));

        let short_row =
            "id,amount,category,date,note,payment_method,created_at,updated_at\ne1,1.00\n";
        assert!(matches!(
            decode_day(short_row),
            Err(Error::Codec { line: 2, .. })
        ));
    }

    #[test]
    fn decode_rejects_unterminated_quote() {
        let content = "id,amount,category,date,note,payment_method,created_at,updated_at\n\"e1,1.00\n";
        assert!(matches!(
            decode_day(content),
            Err(Error::Codec { line: 2, .. })
        ));
    }

    #[test]
    fn settings_payload_roundtrip() {
        let settings = SyncedSettings::default();
        let encoded = encode_settings(&settings).unwrap();
        assert!(encoded.ends_with('\n'));
        assert_eq!(decode_settings(&encoded).unwrap(), settings);
    }
}
