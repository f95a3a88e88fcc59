use serde_json::{Map, Value};

use crate::error::{ToolError, ToolResult};

/// Longest sheet name a workbook accepts
pub const MAX_SHEET_NAME_LEN: usize = 31;
const FORBIDDEN_SHEET_CHARS: [char; 7] = ['[', ']', ':', '*', '?', '/', '\\'];

/// Name of the sheet every XLSX report opens with
pub const SUMMARY_SHEET: &str = "Summary";

/// One cell of caller-supplied data
#[derive(Debug, Clone, PartialEq)]
pub enum CellValue {
    Empty,
    Text(String),
    Number(f64),
    Bool(bool),
}

impl CellValue {
    pub fn from_json(value: &Value) -> Self {
        match value {
            Value::Null => CellValue::Empty,
            Value::Bool(b) => CellValue::Bool(*b),
            Value::Number(n) => match n.as_f64() {
                Some(f) => CellValue::Number(f),
                None => CellValue::Text(n.to_string()),
            },
            Value::String(s) => CellValue::Text(s.clone()),
            // Nested values are stored as their compact JSON text
            other => CellValue::Text(other.to_string()),
        }
    }

    pub fn is_empty(&self) -> bool {
        match self {
            CellValue::Empty => true,
            CellValue::Text(s) => s.is_empty(),
            _ => false,
        }
    }

    /// Text shown for the cell, used for column widths and docx rendering
    pub fn display(&self) -> String {
        match self {
            CellValue::Empty => String::new(),
            CellValue::Text(s) => s.clone(),
            CellValue::Number(n) if n.fract() == 0.0 && n.abs() < 1e15 => format!("{}", *n as i64),
            CellValue::Number(n) => n.to_string(),
            CellValue::Bool(true) => "TRUE".to_string(),
            CellValue::Bool(false) => "FALSE".to_string(),
        }
    }
}

pub type Row = Vec<CellValue>;

/// A table with named columns and an index, in the shape pandas calls "split"
#[derive(Debug, Clone, PartialEq)]
pub struct TabularFrame {
    pub columns: Vec<String>,
    pub index: Vec<CellValue>,
    pub data: Vec<Row>,
}

impl TabularFrame {
    /// Accepts `{columns, data, index?}`, a list of records, or a `{column: [values]}` mapping
    pub fn from_value(value: &Value) -> ToolResult<Self> {
        match value {
            Value::Object(map) if map.contains_key("columns") && map.contains_key("data") => {
                Self::from_split(map)
            }
            Value::Array(items) if items.iter().all(Value::is_object) => Self::from_records(items),
            Value::Object(map) if !map.is_empty() && map.values().all(Value::is_array) => {
                Ok(Self::from_column_mapping(map))
            }
            _ => Err(ToolError::invalid_request(
                "Frame must be {\"columns\": [...], \"data\": [[...]]}, a list of records, or a mapping of column name to values",
            )),
        }
    }

    fn from_split(map: &Map<String, Value>) -> ToolResult<Self> {
        let columns = match map.get("columns") {
            Some(Value::Array(cols)) => cols.iter().map(|c| CellValue::from_json(c).display()).collect(),
            _ => return Err(ToolError::invalid_request("Frame \"columns\" must be a list")),
        };

        let data = match map.get("data") {
            Some(Value::Array(rows)) => rows
                .iter()
                .enumerate()
                .map(|(i, row)| match row {
                    Value::Array(cells) => Ok(cells.iter().map(CellValue::from_json).collect()),
                    _ => Err(ToolError::invalid_request(format!(
                        "Frame data row {} must be a list",
                        i + 1
                    ))),
                })
                .collect::<ToolResult<Vec<Row>>>()?,
            _ => return Err(ToolError::invalid_request("Frame \"data\" must be a list of rows")),
        };

        let index = match map.get("index") {
            None | Some(Value::Null) => default_index(data.len()),
            Some(Value::Array(labels)) if labels.len() == data.len() => {
                labels.iter().map(CellValue::from_json).collect()
            }
            Some(Value::Array(labels)) => {
                return Err(ToolError::invalid_request(format!(
                    "Frame index has {} labels for {} rows",
                    labels.len(),
                    data.len()
                )));
            }
            Some(_) => return Err(ToolError::invalid_request("Frame \"index\" must be a list")),
        };

        Ok(Self { columns, index, data })
    }

    fn from_records(items: &[Value]) -> ToolResult<Self> {
        let mut columns: Vec<String> = Vec::new();
        for record in items.iter().filter_map(Value::as_object) {
            for key in record.keys() {
                if !columns.contains(key) {
                    columns.push(key.clone());
                }
            }
        }

        let data = items
            .iter()
            .filter_map(Value::as_object)
            .map(|record| {
                columns
                    .iter()
                    .map(|col| record.get(col).map(CellValue::from_json).unwrap_or(CellValue::Empty))
                    .collect()
            })
            .collect::<Vec<Row>>();

        Ok(Self {
            columns,
            index: default_index(data.len()),
            data,
        })
    }

    fn from_column_mapping(map: &Map<String, Value>) -> Self {
        let columns: Vec<String> = map.keys().cloned().collect();
        let height = map
            .values()
            .filter_map(Value::as_array)
            .map(Vec::len)
            .max()
            .unwrap_or(0);

        let data = (0..height)
            .map(|row| {
                map.values()
                    .map(|values| {
                        values
                            .as_array()
                            .and_then(|v| v.get(row))
                            .map(CellValue::from_json)
                            .unwrap_or(CellValue::Empty)
                    })
                    .collect()
            })
            .collect::<Vec<Row>>();

        Self {
            columns,
            index: default_index(height),
            data,
        }
    }

    /// Flatten to sheet rows; the index column has a blank header
    pub fn to_rows(&self, include_index: bool, include_header: bool) -> Vec<Row> {
        let mut rows = Vec::with_capacity(self.data.len() + 1);

        if include_header {
            let mut header = Vec::with_capacity(self.columns.len() + 1);
            if include_index {
                header.push(CellValue::Empty);
            }
            header.extend(self.columns.iter().map(|c| CellValue::Text(c.clone())));
            rows.push(header);
        }

        for (label, data_row) in self.index.iter().zip(&self.data) {
            let mut row = Vec::with_capacity(data_row.len() + 1);
            if include_index {
                row.push(label.clone());
            }
            row.extend(data_row.iter().cloned());
            rows.push(row);
        }

        rows
    }
}

fn default_index(len: usize) -> Vec<CellValue> {
    (0..len).map(|i| CellValue::Number(i as f64)).collect()
}

/// Body of one report section
#[derive(Debug, Clone, PartialEq)]
pub enum SectionBody {
    None,
    Text(String),
    Items(Vec<String>),
    Data(Box<ContentShape>),
}

#[derive(Debug, Clone, PartialEq)]
pub struct ReportSection {
    pub title: String,
    pub body: SectionBody,
    pub subsections: Vec<ReportSection>,
}

/// A titled document made of ordered, named sections
#[derive(Debug, Clone, PartialEq)]
pub struct ReportStructure {
    pub title: String,
    /// "summary" for documents, "description" for workbooks
    pub summary: Option<String>,
    pub sections: Vec<ReportSection>,
}

impl ReportStructure {
    /// `{title, summary?, sections: [{title, content?, subsections?}]}`
    pub fn from_docx_value(value: &Value) -> ToolResult<Self> {
        let map = value
            .as_object()
            .ok_or_else(|| ToolError::invalid_request("Report data must be an object"))?;
        let title = required_title(map)?;
        let summary = optional_text(map, "summary")?;

        let sections = match map.get("sections") {
            None | Some(Value::Null) => Vec::new(),
            Some(Value::Array(items)) => items
                .iter()
                .enumerate()
                .map(|(i, item)| parse_docx_section(item, &format!("Section {}", i + 1)))
                .collect::<ToolResult<Vec<_>>>()?,
            Some(_) => return Err(ToolError::invalid_request("Report \"sections\" must be a list")),
        };

        Ok(Self {
            title,
            summary,
            sections,
        })
    }

    /// `{title, description?, data: {sheet: content}}` or
    /// `{title, description?, sections: [{name, data}]}`
    pub fn from_xlsx_value(value: &Value) -> ToolResult<Self> {
        let map = value
            .as_object()
            .ok_or_else(|| ToolError::invalid_request("Report data must be an object"))?;
        let title = required_title(map)?;
        let summary = optional_text(map, "description")?;

        let named: Vec<(String, Option<&Value>)> = match (map.get("data"), map.get("sections")) {
            (Some(Value::Object(data)), _) => data.iter().map(|(k, v)| (k.clone(), Some(v))).collect(),
            (None | Some(Value::Null), Some(Value::Array(items))) => items
                .iter()
                .enumerate()
                .map(|(i, item)| {
                    let section = item.as_object().ok_or_else(|| {
                        ToolError::invalid_request(format!("Section {} must be an object", i + 1))
                    })?;
                    let name = section
                        .get("name")
                        .or_else(|| section.get("title"))
                        .and_then(Value::as_str)
                        .unwrap_or_default()
                        .trim()
                        .to_string();
                    if name.is_empty() {
                        return Err(ToolError::invalid_request(format!(
                            "Section {} has no name",
                            i + 1
                        )));
                    }
                    Ok((name, section.get("data")))
                })
                .collect::<ToolResult<Vec<_>>>()?,
            (None | Some(Value::Null), None | Some(Value::Null)) => Vec::new(),
            (None | Some(Value::Null), Some(_)) => {
                return Err(ToolError::invalid_request("Report \"sections\" must be a list"));
            }
            (Some(_), _) => {
                return Err(ToolError::invalid_request(
                    "Report \"data\" must map sheet names to sheet data",
                ));
            }
        };

        let mut seen: Vec<String> = vec![SUMMARY_SHEET.to_lowercase()];
        let mut sections = Vec::with_capacity(named.len());
        for (name, data) in named {
            validate_sheet_name(&name)?;
            let key = name.to_lowercase();
            if seen.contains(&key) {
                return Err(ToolError::invalid_request(format!(
                    "Duplicate sheet name in report: {}",
                    name
                )));
            }
            seen.push(key);

            let body = match data {
                None | Some(Value::Null) => SectionBody::None,
                Some(other) => SectionBody::Data(Box::new(ContentShape::from_value(other)?)),
            };
            sections.push(ReportSection {
                title: name,
                body,
                subsections: Vec::new(),
            });
        }

        Ok(Self {
            title,
            summary,
            sections,
        })
    }

    /// Names of the top-level sections, in order
    pub fn section_titles(&self) -> Vec<String> {
        self.sections.iter().map(|s| s.title.clone()).collect()
    }
}

fn required_title(map: &Map<String, Value>) -> ToolResult<String> {
    match map.get("title") {
        Some(Value::String(s)) if !s.trim().is_empty() => Ok(s.trim().to_string()),
        _ => Err(ToolError::invalid_request("Report title is required")),
    }
}

fn optional_text(map: &Map<String, Value>, key: &str) -> ToolResult<Option<String>> {
    match map.get(key) {
        None | Some(Value::Null) => Ok(None),
        Some(Value::String(s)) => Ok(Some(s.clone())),
        Some(v @ (Value::Number(_) | Value::Bool(_))) => Ok(Some(CellValue::from_json(v).display())),
        Some(_) => Err(ToolError::invalid_request(format!("Report \"{}\" must be text", key))),
    }
}

fn parse_docx_section(value: &Value, label: &str) -> ToolResult<ReportSection> {
    let map = value
        .as_object()
        .ok_or_else(|| ToolError::invalid_request(format!("{} must be an object", label)))?;

    let title = match map.get("title") {
        Some(Value::String(s)) if !s.trim().is_empty() => s.trim().to_string(),
        _ => return Err(ToolError::invalid_request(format!("{} has no title", label))),
    };

    let body = match map.get("content") {
        None | Some(Value::Null) => SectionBody::None,
        Some(Value::Array(items)) => {
            SectionBody::Items(items.iter().map(|v| CellValue::from_json(v).display()).collect())
        }
        Some(other) => SectionBody::Text(CellValue::from_json(other).display()),
    };

    let subsections = match map.get("subsections") {
        None | Some(Value::Null) => Vec::new(),
        Some(Value::Array(items)) => items
            .iter()
            .enumerate()
            .map(|(i, item)| parse_docx_section(item, &format!("{} subsection {}", title, i + 1)))
            .collect::<ToolResult<Vec<_>>>()?,
        Some(_) => {
            return Err(ToolError::invalid_request(format!(
                "Subsections of {} must be a list",
                title
            )));
        }
    };

    Ok(ReportSection {
        title,
        body,
        subsections,
    })
}

/// Caller-supplied content, resolved once from JSON
#[derive(Debug, Clone, PartialEq)]
pub enum ContentShape {
    PlainText(String),
    RowSequence(Vec<Row>),
    TabularFrame(TabularFrame),
    ReportStructure(ReportStructure),
}

impl ContentShape {
    pub fn from_value(value: &Value) -> ToolResult<Self> {
        match value {
            Value::Null => Err(ToolError::invalid_request("Content is empty")),
            Value::String(s) => Ok(ContentShape::PlainText(s.clone())),
            Value::Bool(_) | Value::Number(_) => {
                Ok(ContentShape::RowSequence(vec![vec![CellValue::from_json(value)]]))
            }
            Value::Array(items) if !items.is_empty() && items.iter().all(Value::is_object) => {
                Ok(ContentShape::TabularFrame(TabularFrame::from_value(value)?))
            }
            Value::Array(items) => Ok(ContentShape::RowSequence(
                items
                    .iter()
                    .map(|item| match item {
                        Value::Array(cells) => cells.iter().map(CellValue::from_json).collect(),
                        Value::Object(record) => record.values().map(CellValue::from_json).collect(),
                        scalar => vec![CellValue::from_json(scalar)],
                    })
                    .collect(),
            )),
            Value::Object(map) => {
                if map.contains_key("columns") && map.contains_key("data") {
                    Ok(ContentShape::TabularFrame(TabularFrame::from_value(value)?))
                } else if let Some(frame) = map.get("dataframe") {
                    Ok(ContentShape::TabularFrame(TabularFrame::from_value(frame)?))
                } else if map.contains_key("title") && map.contains_key("sections") {
                    Ok(ContentShape::ReportStructure(ReportStructure::from_docx_value(value)?))
                } else if !map.is_empty() && map.values().all(Value::is_array) {
                    Ok(ContentShape::TabularFrame(TabularFrame::from_value(value)?))
                } else {
                    // Plain mapping: one key/value pair per row
                    Ok(ContentShape::RowSequence(
                        map.iter()
                            .map(|(k, v)| vec![CellValue::Text(k.clone()), CellValue::from_json(v)])
                            .collect(),
                    ))
                }
            }
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            ContentShape::PlainText(_) => "plain-text",
            ContentShape::RowSequence(_) => "row-sequence",
            ContentShape::TabularFrame(_) => "tabular-frame",
            ContentShape::ReportStructure(_) => "report-structure",
        }
    }

    /// Rows to place on a sheet. Frames carry a header row unless appending.
    pub fn to_rows(&self, include_index: bool, include_header: bool) -> Vec<Row> {
        match self {
            ContentShape::PlainText(text) => text
                .lines()
                .map(|line| vec![CellValue::Text(line.to_string())])
                .collect(),
            ContentShape::RowSequence(rows) => rows.clone(),
            ContentShape::TabularFrame(frame) => frame.to_rows(include_index, include_header),
            ContentShape::ReportStructure(report) => {
                let mut rows = vec![vec![CellValue::Text(report.title.clone())]];
                if let Some(summary) = &report.summary {
                    rows.push(vec![CellValue::Text(summary.clone())]);
                }
                for section in &report.sections {
                    rows.push(vec![CellValue::Text(section.title.clone())]);
                    match &section.body {
                        SectionBody::None => {}
                        SectionBody::Text(text) => rows.push(vec![CellValue::Text(text.clone())]),
                        SectionBody::Items(items) => {
                            rows.extend(items.iter().map(|i| vec![CellValue::Text(i.clone())]))
                        }
                        SectionBody::Data(data) => rows.extend(data.to_rows(false, true)),
                    }
                }
                rows
            }
        }
    }
}

/// Sheet names: 1 to 31 characters, none of `[]:*?/\`
pub fn validate_sheet_name(name: &str) -> ToolResult<()> {
    if name.trim().is_empty() {
        return Err(ToolError::invalid_request("Sheet name must not be empty"));
    }
    if name.chars().count() > MAX_SHEET_NAME_LEN {
        return Err(ToolError::invalid_request(format!(
            "Sheet name '{}' is longer than {} characters",
            name, MAX_SHEET_NAME_LEN
        )));
    }
    if let Some(c) = name.chars().find(|c| FORBIDDEN_SHEET_CHARS.contains(c)) {
        return Err(ToolError::invalid_request(format!(
            "Sheet name '{}' contains the forbidden character '{}'",
            name, c
        )));
    }
    Ok(())
}

/// Resolve a `{sheet name: content}` mapping, keeping the caller's order
pub fn parse_sheets(value: &Value) -> ToolResult<Vec<(String, ContentShape)>> {
    parse_named(value, "Workbook data", ContentShape::from_value)
}

/// Resolve a `{sheet name: frame}` mapping, keeping the caller's order
pub fn parse_frames(value: &Value) -> ToolResult<Vec<(String, TabularFrame)>> {
    parse_named(value, "Dataframes", TabularFrame::from_value)
}

fn parse_named<T>(
    value: &Value,
    what: &str,
    parse: impl Fn(&Value) -> ToolResult<T>,
) -> ToolResult<Vec<(String, T)>> {
    let map = match value {
        Value::Object(map) if !map.is_empty() => map,
        _ => {
            return Err(ToolError::invalid_request(format!(
                "{} must map at least one sheet name to its data",
                what
            )));
        }
    };

    let mut seen: Vec<String> = Vec::with_capacity(map.len());
    let mut sheets = Vec::with_capacity(map.len());
    for (name, data) in map {
        validate_sheet_name(name)?;
        let key = name.to_lowercase();
        if seen.contains(&key) {
            return Err(ToolError::invalid_request(format!("Duplicate sheet name: {}", name)));
        }
        seen.push(key);

        let parsed = parse(data).map_err(|e| {
            ToolError::invalid_request(format!("Sheet '{}': {}", name, e.message))
        })?;
        sheets.push((name.clone(), parsed));
    }
    Ok(sheets)
}

/// Convert a small frame and check the result; used by the startup prober
#[cfg(feature = "xlsx")]
pub fn probe_tabular() -> anyhow::Result<()> {
    let frame = TabularFrame::from_value(&serde_json::json!({
        "columns": ["a"],
        "data": [[1]],
        "index": ["x"],
    }))?;
    let rows = frame.to_rows(true, true);
    anyhow::ensure!(
        rows == vec![
            vec![CellValue::Empty, CellValue::Text("a".to_string())],
            vec![CellValue::Text("x".to_string()), CellValue::Number(1.0)],
        ],
        "Tabular conversion produced unexpected rows"
    );
    Ok(())
}
