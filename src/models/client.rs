use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::db::{Document, DocumentId, StoreError};

/// Lifecycle stage of a client
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Category {
    #[default]
    Deposit,
    Building,
    Completed,
}

impl Category {
    /// Display order of the client groups
    pub const ALL: [Category; 3] = [Category::Deposit, Category::Building, Category::Completed];

    pub fn as_str(&self) -> &'static str {
        match self {
            Category::Deposit => "deposit",
            Category::Building => "building",
            Category::Completed => "completed",
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            Category::Deposit => "Deposit",
            Category::Building => "Building",
            Category::Completed => "Completed",
        }
    }

    pub fn next(&self) -> Category {
        match self {
            Category::Deposit => Category::Building,
            Category::Building => Category::Completed,
            Category::Completed => Category::Deposit,
        }
    }

    pub fn previous(&self) -> Category {
        match self {
            Category::Deposit => Category::Completed,
            Category::Building => Category::Deposit,
            Category::Completed => Category::Building,
        }
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// A construction customer as stored in the `clients` collection
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Client {
    #[serde(skip)]
    pub id: DocumentId,
    pub year: i32,
    #[serde(default)]
    pub category: Category,
    #[serde(default)]
    pub client_number: String,
    pub last_name: String,
    pub first_name: String,
    #[serde(default)]
    pub phone: String,
    #[serde(default)]
    pub hide_project_icon: bool,
    #[serde(default)]
    pub created_at: Option<DateTime<Utc>>,
}

impl Client {
    pub fn from_document(document: &Document) -> Result<Self, StoreError> {
        let mut client: Client = document.decode()?;
        client.id = document.id;
        Ok(client)
    }

    /// "{last} {first}", also the title of the client's project tile
    pub fn display_name(&self) -> String {
        format!("{} {}", self.last_name, self.first_name)
    }
}

/// Required form fields, in form order
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RequiredField {
    LastName,
    FirstName,
    Phone,
}

impl fmt::Display for RequiredField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            RequiredField::LastName => "last name",
            RequiredField::FirstName => "first name",
            RequiredField::Phone => "phone",
        })
    }
}

/// Editable client fields as collected by the client form
#[derive(Debug, Clone, PartialEq)]
pub struct NewClient {
    pub year: i32,
    pub category: Category,
    pub last_name: String,
    pub first_name: String,
    pub phone: String,
    pub hide_project_icon: bool,
}

impl NewClient {
    pub fn new(year: i32) -> Self {
        Self {
            year,
            category: Category::Deposit,
            last_name: String::new(),
            first_name: String::new(),
            phone: String::new(),
            hide_project_icon: false,
        }
    }

    pub fn from_existing(client: &Client) -> Self {
        Self {
            year: client.year,
            category: client.category,
            last_name: client.last_name.clone(),
            first_name: client.first_name.clone(),
            phone: client.phone.clone(),
            hide_project_icon: client.hide_project_icon,
        }
    }

    /// First required field left blank, if any
    pub fn missing_field(&self) -> Option<RequiredField> {
        [
            (RequiredField::LastName, &self.last_name),
            (RequiredField::FirstName, &self.first_name),
            (RequiredField::Phone, &self.phone),
        ]
        .into_iter()
        .find(|(_, value)| value.trim().is_empty())
        .map(|(field, _)| field)
    }
}
