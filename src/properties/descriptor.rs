//! Security descriptor parsing
//!
//! Sources hand over access-control state as a platform-neutral descriptor
//! string in SDDL form ("O:...G:...D:(...)(...)S:(...)"). Destinations
//! rarely accept the whole thing at once, so the descriptor is decomposed
//! into owner, group, DACL, and SACL components that can each be applied
//! (or dropped) independently.

use crate::error::{CloudMoveError, Result};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Kind of one access-control entry
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AccessEntryType {
    /// Grants the listed rights
    Allow,
    /// Denies the listed rights
    Deny,
    /// Audits use of the listed rights
    Audit,
    /// Raises an alarm on use of the listed rights
    Alarm,
}

impl AccessEntryType {
    fn parse(token: &str) -> Option<Self> {
        match token {
            "A" => Some(Self::Allow),
            "D" => Some(Self::Deny),
            "AU" => Some(Self::Audit),
            "AL" => Some(Self::Alarm),
            _ => None,
        }
    }

    fn token(&self) -> &'static str {
        match self {
            Self::Allow => "A",
            Self::Deny => "D",
            Self::Audit => "AU",
            Self::Alarm => "AL",
        }
    }
}

/// One access-control entry: `(type;flags;rights;;;trustee)`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccessEntry {
    /// Allow/deny/audit/alarm
    pub entry_type: AccessEntryType,
    /// Inheritance flag tokens, verbatim
    pub flags: String,
    /// Rights tokens, verbatim (e.g. "FA", "FRFW")
    pub rights: String,
    /// SID string of the trustee
    pub trustee: String,
}

/// An ordered list of access-control entries
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccessList {
    /// Entries in descriptor order
    pub entries: Vec<AccessEntry>,
}

/// A decomposed security descriptor
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SecurityDescriptor {
    /// Owner SID string
    pub owner: Option<String>,
    /// Group SID string
    pub group: Option<String>,
    /// Discretionary access list
    pub dacl: Option<AccessList>,
    /// System (audit) access list; many destinations refuse it
    pub sacl: Option<AccessList>,
}

impl SecurityDescriptor {
    /// Parse a descriptor string into its components.
    ///
    /// Component failures come back as named
    /// [`CloudMoveError::DescriptorParse`] errors so the caller can report
    /// exactly which part of the descriptor was unusable.
    pub fn parse(descriptor: &str) -> Result<Self> {
        let descriptor = descriptor.trim();
        if descriptor.is_empty() {
            return Err(parse_error("descriptor", "empty string"));
        }

        // Every ':' in SDDL belongs to a section marker (SIDs and ACEs
        // never contain one), so section boundaries are the characters
        // immediately preceding each colon.
        let mut markers: Vec<(usize, char)> = Vec::new();
        for (colon, _) in descriptor.match_indices(':') {
            if colon == 0 {
                return Err(parse_error("sections", "descriptor starts with ':'"));
            }
            let start = colon - 1;
            if !descriptor.is_char_boundary(start) {
                return Err(parse_error("sections", "malformed section marker"));
            }
            let marker = descriptor[start..].chars().next().unwrap_or('?');
            if !matches!(marker, 'O' | 'G' | 'D' | 'S') {
                return Err(parse_error(
                    "sections",
                    format!("unknown section marker '{marker}:'"),
                ));
            }
            markers.push((start, marker));
        }

        if markers.is_empty() || markers[0].0 != 0 {
            return Err(parse_error("sections", "no leading section marker"));
        }

        let mut parsed = SecurityDescriptor::default();
        for (i, (start, marker)) in markers.iter().enumerate() {
            let value_start = start + 2;
            let value_end = markers.get(i + 1).map_or(descriptor.len(), |(next, _)| *next);
            let value = &descriptor[value_start..value_end];

            match marker {
                'O' => {
                    if value.is_empty() {
                        return Err(parse_error("owner", "missing SID"));
                    }
                    parsed.owner = Some(value.to_string());
                }
                'G' => {
                    if value.is_empty() {
                        return Err(parse_error("group", "missing SID"));
                    }
                    parsed.group = Some(value.to_string());
                }
                'D' => parsed.dacl = Some(parse_access_list(value, "DACL")?),
                'S' => parsed.sacl = Some(parse_access_list(value, "SACL")?),
                _ => unreachable!("validated above"),
            }
        }

        Ok(parsed)
    }

    /// True if no component is present
    pub fn is_empty(&self) -> bool {
        self.owner.is_none() && self.group.is_none() && self.dacl.is_none() && self.sacl.is_none()
    }
}

impl fmt::Display for SecurityDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(owner) = &self.owner {
            write!(f, "O:{owner}")?;
        }
        if let Some(group) = &self.group {
            write!(f, "G:{group}")?;
        }
        if let Some(dacl) = &self.dacl {
            write!(f, "D:")?;
            write_access_list(f, dacl)?;
        }
        if let Some(sacl) = &self.sacl {
            write!(f, "S:")?;
            write_access_list(f, sacl)?;
        }
        Ok(())
    }
}

fn write_access_list(f: &mut fmt::Formatter<'_>, list: &AccessList) -> fmt::Result {
    for entry in &list.entries {
        write!(
            f,
            "({};{};{};;;{})",
            entry.entry_type.token(),
            entry.flags,
            entry.rights,
            entry.trustee
        )?;
    }
    Ok(())
}

fn parse_access_list(value: &str, component: &str) -> Result<AccessList> {
    let mut entries = Vec::new();
    let mut rest = value;

    while !rest.is_empty() {
        if !rest.starts_with('(') {
            return Err(parse_error(component, format!("expected '(' at '{rest}'")));
        }
        let end = rest
            .find(')')
            .ok_or_else(|| parse_error(component, "unterminated access entry"))?;
        entries.push(parse_access_entry(&rest[1..end], component)?);
        rest = &rest[end + 1..];
    }

    Ok(AccessList { entries })
}

fn parse_access_entry(body: &str, component: &str) -> Result<AccessEntry> {
    let fields: Vec<&str> = body.split(';').collect();
    if fields.len() != 6 {
        return Err(parse_error(
            component,
            format!("access entry has {} fields, expected 6", fields.len()),
        ));
    }

    let entry_type = AccessEntryType::parse(fields[0])
        .ok_or_else(|| parse_error(component, format!("unknown entry type '{}'", fields[0])))?;

    if fields[5].is_empty() {
        return Err(parse_error(component, "access entry has no trustee"));
    }

    Ok(AccessEntry {
        entry_type,
        flags: fields[1].to_string(),
        rights: fields[2].to_string(),
        trustee: fields[5].to_string(),
    })
}

fn parse_error(component: &str, message: impl Into<String>) -> CloudMoveError {
    CloudMoveError::DescriptorParse {
        component: component.to_string(),
        message: message.into(),
    }
}

/// Well-known SID strings
pub mod well_known_sids {
    /// Everyone
    pub const EVERYONE: &str = "WD";
    /// Built-in administrators
    pub const ADMINISTRATORS: &str = "BA";
    /// Local system
    pub const LOCAL_SYSTEM: &str = "SY";
}
