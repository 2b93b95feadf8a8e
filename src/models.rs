//! CasaLink domain records written through the sync layer.
//!
//! These types are serialized as camelCase JSON to match the document
//! collections the landlord and tenant portals read from.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;

pub const TENANTS: &str = "tenants";
pub const BILLS: &str = "bills";
pub const MAINTENANCE_REQUESTS: &str = "maintenanceRequests";
pub const PAYMENTS: &str = "payments";

/// Local validation failure. Never queued, never retried.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("Invalid {field}: {reason}")]
pub struct ValidationError {
    pub field: &'static str,
    pub reason: String,
}

impl ValidationError {
    fn new(field: &'static str, reason: impl Into<String>) -> Self {
        Self {
            field,
            reason: reason.into(),
        }
    }
}

/// Checks a record can be sent to the remote store at all.
pub trait Validate {
    fn validate(&self) -> Result<(), ValidationError>;
}

fn require_text(field: &'static str, value: &str) -> Result<(), ValidationError> {
    if value.trim().is_empty() {
        return Err(ValidationError::new(field, "must not be empty"));
    }
    Ok(())
}

fn require_amount(field: &'static str, value: f64) -> Result<(), ValidationError> {
    if !value.is_finite() || value <= 0.0 {
        return Err(ValidationError::new(field, "must be a positive amount"));
    }
    Ok(())
}

/// A tenant being added to a landlord's property.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewTenant {
    pub name: String,
    pub email: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub phone: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub unit_id: Option<String>,
    pub landlord_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub monthly_rent: Option<f64>,
    /// ISO date (YYYY-MM-DD).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub lease_start: Option<String>,
}

impl Validate for NewTenant {
    fn validate(&self) -> Result<(), ValidationError> {
        require_text("name", &self.name)?;
        require_text("landlordId", &self.landlord_id)?;
        if !self.email.contains('@') {
            return Err(ValidationError::new("email", "must be an e-mail address"));
        }
        if let Some(rent) = self.monthly_rent {
            require_amount("monthlyRent", rent)?;
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BillStatus {
    #[default]
    Unpaid,
    Paid,
}

/// A bill issued by a landlord to a tenant.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewBill {
    pub tenant_id: String,
    pub landlord_id: String,
    pub amount: f64,
    pub description: String,
    /// ISO date (YYYY-MM-DD).
    pub due_date: String,
    #[serde(default)]
    pub status: BillStatus,
}

impl Validate for NewBill {
    fn validate(&self) -> Result<(), ValidationError> {
        require_text("tenantId", &self.tenant_id)?;
        require_text("landlordId", &self.landlord_id)?;
        require_text("description", &self.description)?;
        require_text("dueDate", &self.due_date)?;
        require_amount("amount", self.amount)
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Priority {
    Low,
    #[default]
    Medium,
    High,
    Emergency,
}

impl FromStr for Priority {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "low" => Ok(Priority::Low),
            "medium" => Ok(Priority::Medium),
            "high" => Ok(Priority::High),
            "emergency" => Ok(Priority::Emergency),
            other => Err(ValidationError::new(
                "priority",
                format!("unknown priority '{}'", other),
            )),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MaintenanceStatus {
    #[default]
    Open,
    InProgress,
    Resolved,
}

/// A maintenance request submitted from the tenant portal.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MaintenanceRequest {
    pub tenant_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub unit_id: Option<String>,
    pub title: String,
    pub description: String,
    #[serde(default)]
    pub priority: Priority,
    #[serde(default)]
    pub status: MaintenanceStatus,
}

impl Validate for MaintenanceRequest {
    fn validate(&self) -> Result<(), ValidationError> {
        require_text("tenantId", &self.tenant_id)?;
        require_text("title", &self.title)?;
        require_text("description", &self.description)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PaymentMethod {
    Cash,
    BankTransfer,
    Gcash,
    Card,
    Other,
}

impl FromStr for PaymentMethod {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().replace('-', "_").as_str() {
            "cash" => Ok(PaymentMethod::Cash),
            "bank_transfer" | "bank" => Ok(PaymentMethod::BankTransfer),
            "gcash" => Ok(PaymentMethod::Gcash),
            "card" => Ok(PaymentMethod::Card),
            "other" => Ok(PaymentMethod::Other),
            other => Err(ValidationError::new(
                "method",
                format!("unknown payment method '{}'", other),
            )),
        }
    }
}

impl fmt::Display for PaymentMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            PaymentMethod::Cash => "cash",
            PaymentMethod::BankTransfer => "bank transfer",
            PaymentMethod::Gcash => "GCash",
            PaymentMethod::Card => "card",
            PaymentMethod::Other => "other",
        };
        f.write_str(label)
    }
}

/// A payment against an existing bill. Recording it also marks the bill paid.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PaymentRecord {
    pub bill_id: String,
    pub tenant_id: String,
    pub amount: f64,
    pub method: PaymentMethod,
    /// When the payment was made (Unix ms).
    pub paid_at: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reference: Option<String>,
}

impl Validate for PaymentRecord {
    fn validate(&self) -> Result<(), ValidationError> {
        require_text("billId", &self.bill_id)?;
        require_text("tenantId", &self.tenant_id)?;
        require_amount("amount", self.amount)
    }
}
