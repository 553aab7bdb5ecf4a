//! CSV parsing for donation and bank-statement imports.
//!
//! Parsing is lenient per row: a row that cannot be understood becomes a
//! [`RowError`] and the rest of the file is still read. Only a missing
//! required column fails the whole file.

use std::collections::HashMap;
use std::io::Read;

use chrono::NaiveDate;
use csv::{ReaderBuilder, StringRecord, Trim};
use serde::Serialize;

use crate::error::{CoreError, Result};
use crate::matching::DonorProfile;
use crate::money::Amount;
use crate::payment::PaymentMethod;

/// A row that could not be imported
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RowError {
    /// 1-based line in the source file (header is line 1)
    pub line: u64,
    pub message: String,
}

/// Result of parsing one CSV file
#[derive(Debug, Clone)]
pub struct ParsedImport<T> {
    pub rows: Vec<T>,
    pub errors: Vec<RowError>,
}

/// One donation row from a caging export
#[derive(Debug, Clone)]
pub struct DonationRow {
    pub line: u64,
    pub amount: Amount,
    pub received_date: NaiveDate,
    pub method: PaymentMethod,
    pub check_number: Option<String>,
    pub notes: Option<String>,
    pub donor: DonorProfile,
    pub city: Option<String>,
    pub state: Option<String>,
}

/// One line of a bank statement
#[derive(Debug, Clone)]
pub struct BankRow {
    pub line: u64,
    pub posted_date: NaiveDate,
    pub amount: Amount,
    pub description: Option<String>,
    pub reference: Option<String>,
}

/// Parse `YYYY-MM-DD` or `MM/DD/YYYY`.
pub fn parse_date(s: &str) -> Result<NaiveDate> {
    let s = s.trim();
    NaiveDate::parse_from_str(s, "%Y-%m-%d")
        .or_else(|_| NaiveDate::parse_from_str(s, "%m/%d/%Y"))
        .map_err(|_| CoreError::InvalidDate { value: s.to_owned() })
}

/// Column lookup by lowercase header name
struct Columns(HashMap<String, usize>);

impl Columns {
    fn from_headers(headers: &StringRecord, required: &[&str]) -> Result<Self> {
        let map: HashMap<String, usize> = headers
            .iter()
            .enumerate()
            .map(|(i, h)| (h.trim().to_lowercase(), i))
            .collect();

        let missing: Vec<&str> = required
            .iter()
            .copied()
            .filter(|col| !map.contains_key(*col))
            .collect();
        if !missing.is_empty() {
            return Err(CoreError::csv(format!(
                "missing required column(s): {}",
                missing.join(", ")
            )));
        }

        Ok(Self(map))
    }

    /// Non-empty trimmed value for a column
    fn get(&self, record: &StringRecord, name: &str) -> Option<String> {
        self.0
            .get(name)
            .and_then(|i| record.get(*i))
            .map(str::trim)
            .filter(|v| !v.is_empty())
            .map(str::to_owned)
    }

    fn require(&self, record: &StringRecord, name: &str) -> std::result::Result<String, String> {
        self.get(record, name)
            .ok_or_else(|| format!("{} is required", name))
    }
}

fn read_rows<R, T, F>(input: R, required: &[&str], mut parse_row: F) -> Result<ParsedImport<T>>
where
    R: Read,
    F: FnMut(&Columns, &StringRecord, u64) -> std::result::Result<T, String>,
{
    let mut reader = ReaderBuilder::new()
        .has_headers(true)
        .flexible(true)
        .trim(Trim::All)
        .from_reader(input);

    let columns = Columns::from_headers(reader.headers()?, required)?;
    let mut parsed = ParsedImport {
        rows: Vec::new(),
        errors: Vec::new(),
    };

    for (idx, record) in reader.records().enumerate() {
        // Header is line 1; fall back to the record index when csv has no position.
        let fallback_line = idx as u64 + 2;
        match record {
            Ok(record) => {
                let line = record.position().map(|p| p.line()).unwrap_or(fallback_line);
                if record.iter().all(|f| f.trim().is_empty()) {
                    continue;
                }
                match parse_row(&columns, &record, line) {
                    Ok(row) => parsed.rows.push(row),
                    Err(message) => parsed.errors.push(RowError { line, message }),
                }
            }
            Err(e) => parsed.errors.push(RowError {
                line: e.position().map(|p| p.line()).unwrap_or(fallback_line),
                message: e.to_string(),
            }),
        }
    }

    tracing::debug!(
        rows = parsed.rows.len(),
        errors = parsed.errors.len(),
        "parsed CSV import"
    );
    Ok(parsed)
}

/// Parse a donation CSV.
///
/// Required columns: `amount`, `received_date`. Method defaults to `check`.
pub fn parse_donations<R: Read>(input: R) -> Result<ParsedImport<DonationRow>> {
    read_rows(input, &["amount", "received_date"], |cols, rec, line| {
        let amount = Amount::parse(&cols.require(rec, "amount")?).map_err(|e| e.to_string())?;
        if !amount.is_positive() {
            return Err("amount must be positive".to_owned());
        }
        let received_date =
            parse_date(&cols.require(rec, "received_date")?).map_err(|e| e.to_string())?;
        let method = match cols.get(rec, "method") {
            Some(m) => m
                .parse::<PaymentMethod>()
                .map_err(|v| format!("unknown payment method '{}'", v))?,
            None => PaymentMethod::Check,
        };

        Ok(DonationRow {
            line,
            amount,
            received_date,
            method,
            check_number: cols.get(rec, "check_number"),
            notes: cols.get(rec, "notes"),
            donor: DonorProfile {
                first_name: cols.get(rec, "first_name"),
                last_name: cols.get(rec, "last_name"),
                email: cols.get(rec, "email"),
                postal_code: cols.get(rec, "postal_code"),
                address1: cols.get(rec, "address1"),
            },
            city: cols.get(rec, "city"),
            state: cols.get(rec, "state"),
        })
    })
}

/// Parse a bank statement CSV.
///
/// Required columns: `posted_date`, `amount`.
pub fn parse_bank_statement<R: Read>(input: R) -> Result<ParsedImport<BankRow>> {
    read_rows(input, &["posted_date", "amount"], |cols, rec, line| {
        let posted_date =
            parse_date(&cols.require(rec, "posted_date")?).map_err(|e| e.to_string())?;
        let amount = Amount::parse(&cols.require(rec, "amount")?).map_err(|e| e.to_string())?;

        Ok(BankRow {
            line,
            posted_date,
            amount,
            description: cols.get(rec, "description"),
            reference: cols.get(rec, "reference"),
        })
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_both_date_formats() {
        let d = NaiveDate::from_ymd_opt(2024, 3, 9).unwrap();
        assert_eq!(parse_date("2024-03-09").unwrap(), d);
        assert_eq!(parse_date("03/09/2024").unwrap(), d);
        assert!(parse_date("9 March 2024").is_err());
    }

    #[test]
    fn donation_rows_and_errors() {
        let csv = "\
First_Name,Last_Name,Email,Amount,Received_Date,Method,Check_Number
Ann,Lee,ann@example.org,$25.00,2024-01-05,check,1001
Bob,Stone,,abc,2024-01-05,,
Cy,Young,,10,01/06/2024,cash,
Dee,Ray,,5,2024-01-07,barter,
";
        let parsed = parse_donations(csv.as_bytes()).unwrap();

        assert_eq!(parsed.rows.len(), 2);
        assert_eq!(parsed.rows[0].amount.cents(), 2500);
        assert_eq!(parsed.rows[0].check_number.as_deref(), Some("1001"));
        assert_eq!(parsed.rows[0].donor.email.as_deref(), Some("ann@example.org"));
        assert_eq!(parsed.rows[1].method, PaymentMethod::Cash);

        assert_eq!(parsed.errors.len(), 2);
        assert_eq!(parsed.errors[0].line, 3);
        assert!(parsed.errors[0].message.contains("Invalid amount"));
        assert_eq!(parsed.errors[1].line, 5);
        assert!(parsed.errors[1].message.contains("barter"));
    }

    #[test]
    fn method_defaults_to_check() {
        let csv = "amount,received_date\n12.50,2024-02-01\n";
        let parsed = parse_donations(csv.as_bytes()).unwrap();
        assert_eq!(parsed.rows[0].method, PaymentMethod::Check);
        assert!(parsed.rows[0].donor.last_name.is_none());
    }

    #[test]
    fn rejects_non_positive_donation() {
        let csv = "amount,received_date\n0,2024-02-01\n-5,2024-02-01\n";
        let parsed = parse_donations(csv.as_bytes()).unwrap();
        assert!(parsed.rows.is_empty());
        assert_eq!(parsed.errors.len(), 2);
    }

    #[test]
    fn missing_required_column_fails_file() {
        let csv = "name,amount\nAnn,5\n";
        let err = parse_donations(csv.as_bytes()).unwrap_err();
        assert!(err.to_string().contains("received_date"));
    }

    #[test]
    fn skips_blank_lines() {
        let csv = "amount,received_date\n5,2024-02-01\n,\n6,2024-02-02\n";
        let parsed = parse_donations(csv.as_bytes()).unwrap();
        assert_eq!(parsed.rows.len(), 2);
        assert!(parsed.errors.is_empty());
    }

    #[test]
    fn bank_statement_allows_negative_amounts() {
        let csv = "Posted_Date,Amount,Description,Reference\n2024-01-31,1250.00,DEPOSIT,ref-1\n2024-01-31,-4.00,FEE,\n";
        let parsed = parse_bank_statement(csv.as_bytes()).unwrap();
        assert_eq!(parsed.rows.len(), 2);
        assert_eq!(parsed.rows[1].amount.cents(), -400);
        assert!(parsed.rows[1].reference.is_none());
    }
}
