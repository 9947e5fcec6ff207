// core/src/application/mod.rs

//! Whitelist and department applications stored as spreadsheet rows.

pub mod layout;

use crate::error::CoreError;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

pub use layout::{CellCodec, Column, SheetLayout};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ApplicationKind {
  Whitelist,
  Ems,
  Police,
  Doj,
  Doc,
}

impl ApplicationKind {
  pub const ALL: [ApplicationKind; 5] = [
    ApplicationKind::Whitelist,
    ApplicationKind::Ems,
    ApplicationKind::Police,
    ApplicationKind::Doj,
    ApplicationKind::Doc,
  ];

  pub fn as_str(self) -> &'static str {
    match self {
      ApplicationKind::Whitelist => "whitelist",
      ApplicationKind::Ems => "ems",
      ApplicationKind::Police => "police",
      ApplicationKind::Doj => "doj",
      ApplicationKind::Doc => "doc",
    }
  }

  pub fn layout(self) -> &'static SheetLayout {
    layout::layout_for(self)
  }
}

impl fmt::Display for ApplicationKind {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(self.as_str())
  }
}

impl FromStr for ApplicationKind {
  type Err = CoreError;

  fn from_str(s: &str) -> Result<Self, Self::Err> {
    ApplicationKind::ALL
      .into_iter()
      .find(|kind| kind.as_str().eq_ignore_ascii_case(s.trim()))
      .ok_or_else(|| CoreError::validation("Invalid application type"))
  }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ApplicationStatus {
  #[default]
  Pending,
  Approved,
  Rejected,
}

impl ApplicationStatus {
  pub fn as_str(self) -> &'static str {
    match self {
      ApplicationStatus::Pending => "pending",
      ApplicationStatus::Approved => "approved",
      ApplicationStatus::Rejected => "rejected",
    }
  }

  /// Reads a status cell. Blank or unrecognised text counts as pending.
  pub fn from_cell(cell: &str) -> Self {
    match cell.trim().to_ascii_lowercase().as_str() {
      "approved" => ApplicationStatus::Approved,
      "rejected" => ApplicationStatus::Rejected,
      _ => ApplicationStatus::Pending,
    }
  }
}

impl fmt::Display for ApplicationStatus {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(self.as_str())
  }
}

/// One submitted form. `id` and `submittedAt` are both the column A timestamp.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Application {
  pub id: String,
  #[serde(rename = "type")]
  pub kind: ApplicationKind,
  pub submitted_at: String,
  pub username: String,
  pub discord_id: String,
  /// Kind-specific answers keyed by their camelCase field name.
  #[serde(flatten)]
  pub answers: BTreeMap<String, Value>,
  pub status: ApplicationStatus,
  pub reviewed_by: String,
  pub reviewed_at: String,
}

impl Application {
  pub fn answer_text(&self, field: &str) -> Option<&str> {
    self.answers.get(field).and_then(Value::as_str)
  }
}
