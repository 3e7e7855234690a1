//! Moving tabular data between the host and R data frames.
//!
//! [`Conversion`] is the handle returned by [`crate::bridge::initialize`].
//! Frames go to R as a `data.frame(...)` literal and come back through a
//! small line format: a `<<col>>` header per column (kind, row count,
//! quoted name) followed by one value per line, `NA` for missing values.

use serde::{Deserialize, Serialize};

use crate::error::{SetupError, SetupResult};
use crate::rcode::{decode_r_string, r_string};
use crate::session::RSession;

/// Values of one column.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "values", rename_all = "lowercase")]
pub enum ColumnData {
    Numeric(Vec<Option<f64>>),
    Logical(Vec<Option<bool>>),
    Text(Vec<Option<String>>),
}

impl ColumnData {
    pub fn len(&self) -> usize {
        match self {
            ColumnData::Numeric(v) => v.len(),
            ColumnData::Logical(v) => v.len(),
            ColumnData::Text(v) => v.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn to_r(&self) -> String {
        let items: Vec<String> = match self {
            ColumnData::Numeric(values) => values
                .iter()
                .map(|v| match v {
                    Some(x) if x.is_nan() => "NaN".to_string(),
                    Some(x) if x.is_infinite() && *x > 0.0 => "Inf".to_string(),
                    Some(x) if x.is_infinite() => "-Inf".to_string(),
                    Some(x) => format!("{x:?}"),
                    None => "NA_real_".to_string(),
                })
                .collect(),
            ColumnData::Logical(values) => values
                .iter()
                .map(|v| match v {
                    Some(true) => "TRUE".to_string(),
                    Some(false) => "FALSE".to_string(),
                    None => "NA".to_string(),
                })
                .collect(),
            ColumnData::Text(values) => values
                .iter()
                .map(|v| match v {
                    Some(s) => r_string(s),
                    None => "NA_character_".to_string(),
                })
                .collect(),
        };
        if items.is_empty() {
            return match self {
                ColumnData::Numeric(_) => "numeric(0)".to_string(),
                ColumnData::Logical(_) => "logical(0)".to_string(),
                ColumnData::Text(_) => "character(0)".to_string(),
            };
        }
        format!("c({})", items.join(", "))
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Column {
    pub name: String,
    pub data: ColumnData,
}

/// Host-side table: named, equally long columns.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Frame {
    pub columns: Vec<Column>,
}

impl Frame {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_column(mut self, name: impl Into<String>, data: ColumnData) -> Self {
        self.columns.push(Column {
            name: name.into(),
            data,
        });
        self
    }

    pub fn column(&self, name: &str) -> Option<&ColumnData> {
        self.columns.iter().find(|c| c.name == name).map(|c| &c.data)
    }

    pub fn n_rows(&self) -> usize {
        self.columns.first().map(|c| c.data.len()).unwrap_or(0)
    }

    /// `data.frame(...)` expression building this frame in R.
    pub fn to_r(&self) -> SetupResult<String> {
        let rows = self.n_rows();
        if let Some(bad) = self.columns.iter().find(|c| c.data.len() != rows) {
            return Err(SetupError::RSession(format!(
                "column {:?} has {} rows, expected {rows}",
                bad.name,
                bad.data.len()
            )));
        }
        let mut args: Vec<String> = self
            .columns
            .iter()
            .map(|c| format!("{} = {}", r_string(&c.name), c.data.to_r()))
            .collect();
        args.push("check.names = FALSE".to_string());
        args.push("stringsAsFactors = FALSE".to_string());
        Ok(format!("data.frame({})", args.join(", ")))
    }
}

const COLUMN_MARKER: &str = "<<col>>";

/// R option set by [`Conversion::activate`].
const CONVERSION_OPTION: &str = "rbridge.conversion";

/// Stops the request unless conversion was activated in this session.
fn require_active() -> String {
    format!(
        "if (!isTRUE(getOption(\"{CONVERSION_OPTION}\"))) stop(\"conversion is not active\")"
    )
}

/// R code that prints `expr` (coerced to a data frame) in the line format.
fn fetch_code(expr: &str) -> String {
    format!(
        r#"{guard}
local({{
  .frame <- as.data.frame({expr}, stringsAsFactors = FALSE)
  for (.name in names(.frame)) {{
    .v <- .frame[[.name]]
    if (is.logical(.v)) {{
      .kind <- "logical"; .out <- ifelse(is.na(.v), "NA", ifelse(.v, "TRUE", "FALSE"))
    }} else if (is.numeric(.v)) {{
      .kind <- "numeric"
      .out <- ifelse(is.nan(.v), "NaN", ifelse(is.na(.v), "NA", sprintf("%.17g", as.double(.v))))
    }} else {{
      .kind <- "text"; .out <- encodeString(as.character(.v), quote = '"')
    }}
    cat("{COLUMN_MARKER}", .kind, length(.v), encodeString(.name, quote = '"'), sep = "\t")
    cat("\n")
    if (length(.out) > 0) writeLines(.out)
  }}
}})"#,
        guard = require_active()
    )
}

fn parse_number(s: &str) -> SetupResult<Option<f64>> {
    match s {
        "NA" => Ok(None),
        "Inf" => Ok(Some(f64::INFINITY)),
        "-Inf" => Ok(Some(f64::NEG_INFINITY)),
        "NaN" => Ok(Some(f64::NAN)),
        other => other
            .parse::<f64>()
            .map(Some)
            .map_err(|_| SetupError::RSession(format!("not a number: {other:?}"))),
    }
}

fn parse_logical(s: &str) -> SetupResult<Option<bool>> {
    match s {
        "NA" => Ok(None),
        "TRUE" => Ok(Some(true)),
        "FALSE" => Ok(Some(false)),
        other => Err(SetupError::RSession(format!("not a logical: {other:?}"))),
    }
}

/// Parse the line format produced by the fetch code.
pub fn decode_frame(lines: &[String]) -> SetupResult<Frame> {
    let mut frame = Frame::new();
    let mut rest = lines.iter();
    while let Some(header) = rest.next() {
        let mut fields = header.splitn(4, '\t');
        let (Some(COLUMN_MARKER), Some(kind), Some(len), Some(name)) =
            (fields.next(), fields.next(), fields.next(), fields.next())
        else {
            return Err(SetupError::RSession(format!(
                "malformed column header: {header:?}"
            )));
        };
        let len: usize = len
            .parse()
            .map_err(|_| SetupError::RSession(format!("bad row count in {header:?}")))?;
        let name = decode_r_string(name)
            .ok_or_else(|| SetupError::RSession(format!("bad column name in {header:?}")))?;
        let values: Vec<&str> = rest.by_ref().take(len).map(String::as_str).collect();
        if values.len() != len {
            return Err(SetupError::RSession(format!(
                "column {name:?} ended after {} of {len} values",
                values.len()
            )));
        }
        let data = match kind {
            "numeric" => ColumnData::Numeric(
                values
                    .iter()
                    .map(|v| parse_number(v))
                    .collect::<SetupResult<_>>()?,
            ),
            "logical" => ColumnData::Logical(
                values
                    .iter()
                    .map(|v| parse_logical(v))
                    .collect::<SetupResult<_>>()?,
            ),
            "text" => ColumnData::Text(values.iter().map(|v| decode_r_string(v)).collect()),
            other => {
                return Err(SetupError::RSession(format!(
                    "unknown column kind {other:?}"
                )))
            }
        };
        frame.columns.push(Column { name, data });
    }
    Ok(frame)
}

/// Conversion-activation handle.
///
/// Holding one means the session has been told conversion is on
/// (`options(rbridge.conversion = TRUE)`). R refuses `assign`/`fetch`
/// requests in a session where that option is not set.
#[derive(Debug, Clone, Copy)]
pub struct Conversion {
    _private: (),
}

impl Conversion {
    pub fn activate(session: &mut impl RSession) -> SetupResult<Self> {
        session.eval(&format!("options({CONVERSION_OPTION} = TRUE)"))?;
        Ok(Self { _private: () })
    }

    /// Bind `frame` to `name` in R's global environment.
    pub fn assign(
        &self,
        session: &mut impl RSession,
        name: &str,
        frame: &Frame,
    ) -> SetupResult<()> {
        let code = format!(
            "{}\nassign({}, {}, envir = globalenv())",
            require_active(),
            r_string(name),
            frame.to_r()?
        );
        session.eval(&code).map(drop)
    }

    /// Evaluate `expr` in R and bring the resulting data frame back.
    pub fn fetch(&self, session: &mut impl RSession, expr: &str) -> SetupResult<Frame> {
        decode_frame(&session.eval(&fetch_code(expr))?)
    }
}
