//! Wizard token codec.
//!
//! All wizard state travels inside component custom ids. The grammar is:
//!
//! ```text
//! {action}/{actor}/{category}/{page}/{filter}[/{ref}]*
//! ```
//!
//! - `action` is a three-letter case-sensitive code from a closed set
//! - `actor` and `category` are canonical base-10 numbers
//! - `page` is a canonical number or empty; `filter` is free of `/` or empty
//! - each action takes a fixed number of refs, none of them empty
//! - a canonical hyphenated GUID ref travels as `~` plus its 32 hex digits
//!
//! Tokens are validated on construction, so anything `encode` emits decodes
//! back to an equal token. Anything else decodes to a `DecodeError`.

use std::fmt;

use greenlight_types::{CategoryId, GreenlightError, UserId};
use uuid::Uuid;

pub const DELIMITER: char = '/';

/// Platform limit on custom id length.
pub const MAX_TOKEN_LEN: usize = 100;

/// Option value selecting every item, or clearing a filter.
pub const ALL_VALUE: &str = "*all*";

/// Prefix of a compacted GUID ref.
const COMPACT_GUID: char = '~';

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ActionKind {
    /// Candidate list select menu. The chosen id arrives as the select value.
    SelectCandidate,
    /// Item list select menu for an entity.
    SelectItem,
    /// Secondary filter select menu.
    SelectFilter,
    PageForward,
    PageBack,
    /// Request button for an entity without items.
    SubmitEntity,
    /// Request button for one item, or every item in the filtered view.
    SubmitItem,
    /// Availability subscription for an already-requested entity.
    Subscribe,
    /// Disabled status buttons. Never acted on.
    Inert,
}

impl ActionKind {
    pub const ALL: [ActionKind; 9] = [
        ActionKind::SelectCandidate,
        ActionKind::SelectItem,
        ActionKind::SelectFilter,
        ActionKind::PageForward,
        ActionKind::PageBack,
        ActionKind::SubmitEntity,
        ActionKind::SubmitItem,
        ActionKind::Subscribe,
        ActionKind::Inert,
    ];

    pub fn code(&self) -> &'static str {
        match self {
            ActionKind::SelectCandidate => "WSC",
            ActionKind::SelectItem => "WSI",
            ActionKind::SelectFilter => "WSF",
            ActionKind::PageForward => "WPF",
            ActionKind::PageBack => "WPB",
            ActionKind::SubmitEntity => "WSE",
            ActionKind::SubmitItem => "WSR",
            ActionKind::Subscribe => "WNR",
            ActionKind::Inert => "WNO",
        }
    }

    pub fn from_code(code: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|a| a.code() == code)
    }

    /// Number of entity refs a token of this kind carries.
    pub fn ref_arity(&self) -> usize {
        match self {
            ActionKind::SelectCandidate | ActionKind::Inert => 0,
            ActionKind::SubmitItem => 2,
            _ => 1,
        }
    }
}

impl fmt::Display for ActionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.code())
    }
}

/// A field set that cannot be encoded.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TokenError {
    #[error("{action} takes {expected} refs, got {found}")]
    RefArity {
        action: ActionKind,
        expected: usize,
        found: usize,
    },
    #[error("{field} must be non-empty and free of '/': {value:?}")]
    InvalidField { field: &'static str, value: String },
    #[error("encoded token is {0} bytes, limit is {MAX_TOKEN_LEN}")]
    TooLong(usize),
}

impl From<TokenError> for GreenlightError {
    fn from(err: TokenError) -> Self {
        GreenlightError::Internal(format!("unencodable wizard token: {err}"))
    }
}

/// A string that is not a token produced by this codec.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DecodeError {
    #[error("token is {0} bytes, limit is {MAX_TOKEN_LEN}")]
    TooLong(usize),
    #[error("token has {0} fields, at least 5 required")]
    MissingFields(usize),
    #[error("unknown action code {0:?}")]
    UnknownAction(String),
    #[error("{field} is not a canonical number: {value:?}")]
    InvalidNumber { field: &'static str, value: String },
    #[error("empty entity ref")]
    EmptyRef,
    #[error("invalid compact ref {0:?}")]
    InvalidRef(String),
    #[error("{action} takes {expected} refs, got {found}")]
    RefArity {
        action: ActionKind,
        expected: usize,
        found: usize,
    },
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct WizardToken {
    action: ActionKind,
    actor_id: UserId,
    category_id: CategoryId,
    entity_refs: Vec<String>,
    page_index: Option<u32>,
    filter: Option<String>,
}

impl WizardToken {
    pub fn new(
        action: ActionKind,
        actor_id: UserId,
        category_id: CategoryId,
        entity_refs: Vec<String>,
        page_index: Option<u32>,
        filter: Option<String>,
    ) -> Result<Self, TokenError> {
        if entity_refs.len() != action.ref_arity() {
            return Err(TokenError::RefArity {
                action,
                expected: action.ref_arity(),
                found: entity_refs.len(),
            });
        }
        for entity_ref in &entity_refs {
            check_field("entity ref", entity_ref)?;
            if entity_ref.starts_with(COMPACT_GUID) {
                return Err(TokenError::InvalidField {
                    field: "entity ref",
                    value: entity_ref.clone(),
                });
            }
        }
        if let Some(filter) = &filter {
            check_field("filter", filter)?;
        }

        let token = Self {
            action,
            actor_id,
            category_id,
            entity_refs,
            page_index,
            filter,
        };
        let len = token.encode().len();
        if len > MAX_TOKEN_LEN {
            return Err(TokenError::TooLong(len));
        }
        Ok(token)
    }

    pub fn action(&self) -> ActionKind {
        self.action
    }

    pub fn actor_id(&self) -> UserId {
        self.actor_id
    }

    pub fn category_id(&self) -> CategoryId {
        self.category_id
    }

    pub fn entity_refs(&self) -> &[String] {
        &self.entity_refs
    }

    /// First entity ref, present for every action with refs.
    pub fn entity_ref(&self) -> Option<&str> {
        self.entity_refs.first().map(String::as_str)
    }

    pub fn page_index(&self) -> Option<u32> {
        self.page_index
    }

    pub fn filter(&self) -> Option<&str> {
        self.filter.as_deref()
    }

    pub fn encode(&self) -> String {
        let mut out = format!(
            "{}{DELIMITER}{}{DELIMITER}{}{DELIMITER}{}{DELIMITER}{}",
            self.action.code(),
            self.actor_id,
            self.category_id,
            self.page_index.map(|p| p.to_string()).unwrap_or_default(),
            self.filter.as_deref().unwrap_or_default(),
        );
        for entity_ref in &self.entity_refs {
            out.push(DELIMITER);
            out.push_str(&compact_ref(entity_ref));
        }
        out
    }

    pub fn decode(raw: &str) -> Result<Self, DecodeError> {
        if raw.len() > MAX_TOKEN_LEN {
            return Err(DecodeError::TooLong(raw.len()));
        }

        let fields: Vec<&str> = raw.split(DELIMITER).collect();
        if fields.len() < 5 {
            return Err(DecodeError::MissingFields(fields.len()));
        }

        let action = ActionKind::from_code(fields[0])
            .ok_or_else(|| DecodeError::UnknownAction(fields[0].to_string()))?;
        let actor_id = parse_canonical::<UserId>("actor", fields[1])?;
        let category_id = parse_canonical::<CategoryId>("category", fields[2])?;
        let page_index = match fields[3] {
            "" => None,
            page => Some(parse_canonical::<u32>("page", page)?),
        };
        let filter = match fields[4] {
            "" => None,
            filter => Some(filter.to_string()),
        };

        let refs = &fields[5..];
        if refs.iter().any(|r| r.is_empty()) {
            return Err(DecodeError::EmptyRef);
        }
        if refs.len() != action.ref_arity() {
            return Err(DecodeError::RefArity {
                action,
                expected: action.ref_arity(),
                found: refs.len(),
            });
        }

        Ok(Self {
            action,
            actor_id,
            category_id,
            entity_refs: refs.iter().map(|r| expand_ref(r)).collect::<Result<_, _>>()?,
            page_index,
            filter,
        })
    }
}

fn check_field(field: &'static str, value: &str) -> Result<(), TokenError> {
    if value.is_empty() || value.contains(DELIMITER) {
        return Err(TokenError::InvalidField {
            field,
            value: value.to_string(),
        });
    }
    Ok(())
}

fn compact_ref(entity_ref: &str) -> String {
    match Uuid::try_parse(entity_ref) {
        Ok(guid) if guid.hyphenated().to_string() == entity_ref => {
            format!("{COMPACT_GUID}{}", guid.simple())
        }
        _ => entity_ref.to_string(),
    }
}

/// Undo `compact_ref`. Only the exact form it emits is accepted.
fn expand_ref(raw: &str) -> Result<String, DecodeError> {
    let Some(hex) = raw.strip_prefix(COMPACT_GUID) else {
        return Ok(raw.to_string());
    };
    match Uuid::try_parse(hex) {
        Ok(guid) if guid.simple().to_string() == hex => Ok(guid.hyphenated().to_string()),
        _ => Err(DecodeError::InvalidRef(raw.to_string())),
    }
}

/// Parse a number that re-encodes to exactly the same text: no sign, no
/// leading zeros, no whitespace.
fn parse_canonical<T>(field: &'static str, value: &str) -> Result<T, DecodeError>
where
    T: std::str::FromStr + ToString,
{
    let invalid = || DecodeError::InvalidNumber {
        field,
        value: value.to_string(),
    };
    if value.is_empty() || !value.bytes().all(|b| b.is_ascii_digit()) {
        return Err(invalid());
    }
    let parsed: T = value.parse().map_err(|_| invalid())?;
    if parsed.to_string() != value {
        return Err(invalid());
    }
    Ok(parsed)
}
