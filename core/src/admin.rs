// core/src/admin.rs

//! Who may review which application sections.

use crate::application::ApplicationKind;
use crate::error::{CoreError, CoreResult};
use serde::{Deserialize, Deserializer, Serialize, Serializer};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Designation {
  All,
  Section(ApplicationKind),
}

impl Designation {
  pub fn as_str(self) -> &'static str {
    match self {
      Designation::All => "all",
      Designation::Section(kind) => kind.as_str(),
    }
  }

  pub fn parse(s: &str) -> CoreResult<Self> {
    if s.trim().eq_ignore_ascii_case("all") {
      return Ok(Designation::All);
    }
    s.parse::<ApplicationKind>()
      .map(Designation::Section)
      .map_err(|_| CoreError::validation(format!("Invalid designation: {}", s)))
  }
}

impl Serialize for Designation {
  fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
    serializer.serialize_str(self.as_str())
  }
}

impl<'de> Deserialize<'de> for Designation {
  fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
    let raw = String::deserialize(deserializer)?;
    Designation::parse(&raw).map_err(serde::de::Error::custom)
  }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AdminAccess {
  pub email: String,
  #[serde(default)]
  pub discord_id: String,
  pub designation: Designation,
}

impl AdminAccess {
  pub fn can_access_section(&self, kind: ApplicationKind) -> bool {
    match self.designation {
      Designation::All => true,
      Designation::Section(section) => section == kind,
    }
  }
}

/// The configured admin roster, matched by e-mail address.
#[derive(Debug, Clone, Default)]
pub struct AdminDirectory {
  admins: Vec<AdminAccess>,
}

impl AdminDirectory {
  pub fn new(admins: Vec<AdminAccess>) -> Self {
    Self { admins }
  }

  /// Parses a JSON array of `{email, discordId, designation}` entries.
  pub fn from_json(raw: &str) -> CoreResult<Self> {
    if raw.trim().is_empty() {
      return Ok(Self::default());
    }
    let admins: Vec<AdminAccess> =
      serde_json::from_str(raw).map_err(|e| CoreError::validation(format!("Invalid admin roster: {}", e)))?;
    Ok(Self::new(admins))
  }

  pub fn lookup(&self, email: &str) -> Option<&AdminAccess> {
    let email = email.trim();
    if email.is_empty() {
      return None;
    }
    self.admins.iter().find(|a| a.email.eq_ignore_ascii_case(email))
  }

  pub fn len(&self) -> usize {
    self.admins.len()
  }

  pub fn is_empty(&self) -> bool {
    self.admins.is_empty()
  }
}
