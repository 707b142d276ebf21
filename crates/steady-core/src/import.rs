//! CSV transaction import
//!
//! Expected header (column order is free, unknown columns are ignored):
//!
//! ```text
//! id,user_id,amount,direction,category,merchant,source,timestamp
//! ```
//!
//! A row the engine cannot attribute to a user (missing or unparsable
//! `user_id` with no default user) is rejected and reported, never fatal to
//! the rest of the file. Every other defect keeps the row: a bad `id` falls
//! back to the row number, and an unparsable amount, timestamp or direction
//! leaves the amount empty so the engine counts the row against data quality.

use std::io::Read;

use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use csv::ReaderBuilder;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::error::Result;
use crate::models::{Direction, Transaction};

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct CsvRow {
    id: Option<String>,
    user_id: Option<String>,
    amount: Option<String>,
    direction: Option<String>,
    category: Option<String>,
    merchant: Option<String>,
    source: Option<String>,
    timestamp: Option<String>,
}

/// A row dropped before reaching the engine
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RejectedRow {
    /// 1-based data row number
    pub line: i64,
    pub reason: String,
}

/// Transactions read from a CSV file plus the rows that were dropped
#[derive(Debug, Default)]
pub struct CsvImport {
    pub transactions: Vec<Transaction>,
    pub rejected: Vec<RejectedRow>,
}

/// Read transactions from CSV
///
/// `default_user` fills rows without a `user_id`. Rows without an `id` get
/// their 1-based row number. Only I/O failures abort the read.
pub fn read_transactions<R: Read>(reader: R, default_user: Option<i64>) -> Result<CsvImport> {
    let mut rdr = ReaderBuilder::new()
        .has_headers(true)
        .flexible(true)
        .trim(csv::Trim::All)
        .from_reader(reader);

    let mut import = CsvImport::default();
    for (index, result) in rdr.deserialize::<CsvRow>().enumerate() {
        let line = index as i64 + 1;
        let outcome = match result {
            Ok(row) => row_to_transaction(row, line, default_user),
            Err(e) if matches!(e.kind(), csv::ErrorKind::Io(_)) => return Err(e.into()),
            Err(e) => Err(e.to_string()),
        };
        match outcome {
            Ok(tx) => import.transactions.push(tx),
            Err(reason) => {
                warn!(line, %reason, "Rejecting CSV row");
                import.rejected.push(RejectedRow { line, reason });
            }
        }
    }

    debug!(
        parsed = import.transactions.len(),
        rejected = import.rejected.len(),
        "Read CSV transactions"
    );
    Ok(import)
}

fn non_empty(field: Option<String>) -> Option<String> {
    field.filter(|s| !s.trim().is_empty())
}

/// Convert one row, or give the reason it cannot be attributed to a user
fn row_to_transaction(
    row: CsvRow,
    line: i64,
    default_user: Option<i64>,
) -> std::result::Result<Transaction, String> {
    let user_id = match non_empty(row.user_id) {
        Some(s) => s
            .parse::<i64>()
            .map_err(|_| format!("invalid user_id '{}'", s))?,
        None => default_user.ok_or_else(|| "missing user_id".to_string())?,
    };

    let id = match non_empty(row.id) {
        Some(s) => s.parse::<i64>().unwrap_or_else(|_| {
            warn!(line, id = %s, "Unparsable id, using row number");
            line
        }),
        None => line,
    };

    let mut signed_amount = non_empty(row.amount).and_then(|s| {
        let parsed = parse_amount(&s);
        if parsed.is_none() {
            warn!(line, amount = %s, "Unparsable amount");
        }
        parsed
    });

    // Without an explicit direction the sign decides: negative is money out
    let by_sign = match signed_amount {
        Some(a) if a < 0.0 => Direction::Debit,
        Some(_) => Direction::Credit,
        None => Direction::Debit,
    };
    let direction = match non_empty(row.direction) {
        Some(s) => match s.parse::<Direction>() {
            Ok(direction) => direction,
            Err(e) => {
                // Income or spending is unknown, so the amount cannot be used
                warn!(line, error = %e, "Unparsable direction");
                signed_amount = None;
                by_sign
            }
        },
        None => by_sign,
    };

    let timestamp = non_empty(row.timestamp).and_then(|s| {
        let parsed = parse_timestamp(&s);
        if parsed.is_none() {
            warn!(line, timestamp = %s, "Unparsable timestamp");
        }
        parsed
    });

    Ok(Transaction {
        id,
        user_id,
        amount: signed_amount.map(f64::abs),
        direction,
        category: non_empty(row.category),
        merchant: non_empty(row.merchant),
        source: non_empty(row.source),
        timestamp,
    })
}

/// Parse an amount string, handling currency symbols and commas
fn parse_amount(s: &str) -> Option<f64> {
    let cleaned: String = s
        .trim()
        .replace(['$', ',', ' '], "")
        .replace('(', "-")
        .replace(')', "");

    cleaned.parse::<f64>().ok().filter(|a| a.is_finite())
}

/// Parse a timestamp in RFC 3339 or a few common naive forms (taken as UTC)
fn parse_timestamp(s: &str) -> Option<DateTime<Utc>> {
    let s = s.trim();

    if let Ok(ts) = DateTime::parse_from_rfc3339(s) {
        return Some(ts.with_timezone(&Utc));
    }

    let datetime_formats = ["%Y-%m-%d %H:%M:%S", "%Y-%m-%dT%H:%M:%S", "%Y-%m-%d %H:%M"];
    for fmt in datetime_formats {
        if let Ok(dt) = NaiveDateTime::parse_from_str(s, fmt) {
            return Some(dt.and_utc());
        }
    }

    let date_formats = [
        "%Y-%m-%d", // 2024-01-15
        "%m/%d/%Y", // 01/15/2024
    ];
    for fmt in date_formats {
        if let Ok(date) = NaiveDate::parse_from_str(s, fmt) {
            return date.and_hms_opt(0, 0, 0).map(|dt| dt.and_utc());
        }
    }

    None
}
