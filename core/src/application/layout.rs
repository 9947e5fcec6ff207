// core/src/application/layout.rs

//! Fixed column layouts of the application spreadsheets.
//!
//! Every sheet starts with `A` = submission timestamp, `B` = submitter
//! username and `C` = Discord id, followed by the kind's answers and three
//! review cells (status, reviewer, review time).

use super::{Application, ApplicationKind, ApplicationStatus};
use serde_json::{Map, Value};
use std::collections::BTreeMap;

pub const SHEET_NAME: &str = "Sheet1";

/// How a cell's text maps to a JSON answer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CellCodec {
  Text,
  /// `Yes` / `No`
  YesNo,
  /// `TRUE` / `FALSE`
  TrueFalse,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Column {
  pub field: &'static str,
  pub index: usize,
  pub codec: CellCodec,
}

const fn text(field: &'static str, index: usize) -> Column {
  Column {
    field,
    index,
    codec: CellCodec::Text,
  }
}

const fn flag(field: &'static str, index: usize, codec: CellCodec) -> Column {
  Column { field, index, codec }
}

#[derive(Debug)]
pub struct SheetLayout {
  pub kind: ApplicationKind,
  pub answers: &'static [Column],
  /// Index of the status cell; reviewer and review time follow it.
  pub status_index: usize,
}

const WHITELIST_ANSWERS: &[Column] = &[
  text("characterName", 3),
  text("experience", 4),
  text("backstory", 5),
  text("powergaming", 6),
  text("newLifeRule", 7),
  text("rdmVdm", 8),
  text("stayingInCharacter", 9),
  text("ruleBreaking", 10),
  text("gunpoint", 11),
  text("agreeToRules", 12),
  text("hasMicrophone", 13),
  text("memorableExperience", 14),
  text("streamer", 15),
  text("streamerLink", 16),
];

const EMS_ANSWERS: &[Column] = &[
  text("fullName", 3),
  text("age", 4),
  text("timezone", 5),
  text("weeklyHours", 6),
  text("priorExperience", 7),
  text("joinReason", 8),
  text("icJoinReason", 9),
  text("medicalCertifications", 10),
  text("backgroundStory", 11),
  text("dateOfBirth", 12),
  text("address", 13),
];

const POLICE_ANSWERS: &[Column] = &[
  text("age", 3),
  text("timezone", 4),
  flag("hasWorkingMic", 5, CellCodec::YesNo),
  text("policeRpExperience", 6),
  text("joinReason", 7),
  text("characterName", 8),
  text("dateOfBirth", 9),
  text("priorEmployment", 10),
  text("fitnessForRole", 11),
  text("stressHandling", 12),
  text("backgroundStory", 13),
];

const DOJ_ANSWERS: &[Column] = &[
  text("age", 3),
  text("timezone", 4),
  flag("understandsGuidelines", 5, CellCodec::TrueFalse),
  text("legalRpBackground", 6),
  text("characterName", 7),
  text("dateOfBirth", 8),
  text("desiredRole", 9),
  text("legalEducation", 10),
  text("caseHistory", 11),
  text("joinReason", 12),
];

const DOC_ANSWERS: &[Column] = &[
  text("characterName", 3),
  text("age", 4),
  text("characterAge", 5),
  text("timezone", 6),
  text("rpExperience", 7),
  text("roleQualification", 8),
  text("background", 9),
  text("workReason", 10),
  text("inmateHandling", 11),
];

static WHITELIST: SheetLayout = SheetLayout {
  kind: ApplicationKind::Whitelist,
  answers: WHITELIST_ANSWERS,
  status_index: 17,
};
static EMS: SheetLayout = SheetLayout {
  kind: ApplicationKind::Ems,
  answers: EMS_ANSWERS,
  status_index: 14,
};
static POLICE: SheetLayout = SheetLayout {
  kind: ApplicationKind::Police,
  answers: POLICE_ANSWERS,
  status_index: 14,
};
static DOJ: SheetLayout = SheetLayout {
  kind: ApplicationKind::Doj,
  answers: DOJ_ANSWERS,
  status_index: 13,
};
static DOC: SheetLayout = SheetLayout {
  kind: ApplicationKind::Doc,
  answers: DOC_ANSWERS,
  status_index: 12,
};

pub fn layout_for(kind: ApplicationKind) -> &'static SheetLayout {
  match kind {
    ApplicationKind::Whitelist => &WHITELIST,
    ApplicationKind::Ems => &EMS,
    ApplicationKind::Police => &POLICE,
    ApplicationKind::Doj => &DOJ,
    ApplicationKind::Doc => &DOC,
  }
}

/// `0 -> A`, `25 -> Z`, `26 -> AA`.
pub fn column_letter(index: usize) -> String {
  let mut n = index + 1;
  let mut letters = Vec::new();
  while n > 0 {
    let rem = (n - 1) % 26;
    letters.push((b'A' + rem as u8) as char);
    n = (n - 1) / 26;
  }
  letters.iter().rev().collect()
}

/// A1 reference of one cell, with a 1-based sheet row.
pub fn cell_ref(column_index: usize, row_number: usize) -> String {
  format!("{}!{}{}", SHEET_NAME, column_letter(column_index), row_number)
}

impl SheetLayout {
  pub fn reviewed_by_index(&self) -> usize {
    self.status_index + 1
  }

  pub fn reviewed_at_index(&self) -> usize {
    self.status_index + 2
  }

  /// Total number of columns, review cells included.
  pub fn width(&self) -> usize {
    self.reviewed_at_index() + 1
  }

  /// Range read by the admin panel: data rows only, header skipped.
  pub fn read_range(&self) -> String {
    format!("{}!A2:{}", SHEET_NAME, column_letter(self.reviewed_at_index()))
  }

  /// Range scanned to locate a row by id before writing a review back.
  pub fn lookup_range(&self) -> String {
    format!("{}!A:Z", SHEET_NAME)
  }

  /// Parses one data row. Returns `None` for rows without a timestamp.
  pub fn from_row(&self, row: &[String]) -> Option<Application> {
    let cell = |index: usize| row.get(index).map(String::as_str).unwrap_or("");
    let id = cell(0).trim();
    if id.is_empty() {
      return None;
    }

    let answers: BTreeMap<String, Value> = self
      .answers
      .iter()
      .map(|col| (col.field.to_string(), decode(col.codec, cell(col.index))))
      .collect();

    Some(Application {
      id: id.to_string(),
      kind: self.kind,
      submitted_at: id.to_string(),
      username: cell(1).to_string(),
      discord_id: cell(2).to_string(),
      answers,
      status: ApplicationStatus::from_cell(cell(self.status_index)),
      reviewed_by: cell(self.reviewed_by_index()).to_string(),
      reviewed_at: cell(self.reviewed_at_index()).to_string(),
    })
  }

  /// Inverse of [`SheetLayout::from_row`]; always produces `width()` cells.
  pub fn to_row(&self, app: &Application) -> Vec<String> {
    let mut row = vec![String::new(); self.width()];
    row[0] = app.submitted_at.clone();
    row[1] = app.username.clone();
    row[2] = app.discord_id.clone();
    for col in self.answers {
      row[col.index] = encode(col.codec, app.answers.get(col.field));
    }
    row[self.status_index] = app.status.as_str().to_string();
    row[self.reviewed_by_index()] = app.reviewed_by.clone();
    row[self.reviewed_at_index()] = app.reviewed_at.clone();
    row
  }

  /// Builds the row appended for a fresh submission.
  ///
  /// `form` holds the submitted answers plus `discordId`; unknown keys are ignored.
  pub fn submission_row(&self, submitted_at: &str, username: &str, form: &Map<String, Value>) -> Vec<String> {
    let answers = self
      .answers
      .iter()
      .filter_map(|col| form.get(col.field).map(|v| (col.field.to_string(), v.clone())))
      .collect();
    let discord_id = form.get("discordId").map(value_text).unwrap_or_default();

    self.to_row(&Application {
      id: submitted_at.to_string(),
      kind: self.kind,
      submitted_at: submitted_at.to_string(),
      username: username.to_string(),
      discord_id,
      answers,
      status: ApplicationStatus::Pending,
      reviewed_by: String::new(),
      reviewed_at: String::new(),
    })
  }

  /// Rows as returned by the values API for [`SheetLayout::read_range`].
  pub fn parse_rows(&self, rows: &[Vec<String>]) -> Vec<Application> {
    rows.iter().filter_map(|row| self.from_row(row)).collect()
  }
}

/// 1-based sheet row whose column A equals `id`, scanning rows from `A1`.
pub fn find_row_number(rows: &[Vec<String>], id: &str) -> Option<usize> {
  rows
    .iter()
    .position(|row| row.first().map(String::as_str) == Some(id))
    .map(|index| index + 1)
}

fn decode(codec: CellCodec, cell: &str) -> Value {
  match codec {
    CellCodec::Text => Value::String(cell.to_string()),
    CellCodec::YesNo => Value::Bool(cell.trim() == "Yes"),
    CellCodec::TrueFalse => Value::Bool(cell.trim().eq_ignore_ascii_case("TRUE")),
  }
}

fn encode(codec: CellCodec, value: Option<&Value>) -> String {
  match codec {
    CellCodec::Text => value.map(value_text).unwrap_or_default(),
    CellCodec::YesNo => if truthy(value) { "Yes" } else { "No" }.to_string(),
    CellCodec::TrueFalse => if truthy(value) { "TRUE" } else { "FALSE" }.to_string(),
  }
}

fn truthy(value: Option<&Value>) -> bool {
  match value {
    Some(Value::Bool(b)) => *b,
    Some(Value::String(s)) => matches!(s.trim().to_ascii_lowercase().as_str(), "yes" | "true" | "on" | "1"),
    Some(Value::Number(n)) => n.as_f64().is_some_and(|f| f != 0.0),
    _ => false,
  }
}

fn value_text(value: &Value) -> String {
  match value {
    Value::Null => String::new(),
    Value::String(s) => s.clone(),
    Value::Bool(b) => b.to_string(),
    other => other.to_string(),
  }
}
