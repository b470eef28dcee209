//! Role → permission authorization.
//!
//! The table is built once at startup (defaults or configuration) and never
//! mutated afterwards; [`PermissionTable::has_permission`] is a pure lookup.

use std::collections::{HashMap, HashSet};
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::BoxofficeError;

/// Back-office staff roles.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    Superadmin,
    Admin,
    Cashier,
    Scanner,
}

impl Role {
    pub const ALL: [Self; 4] = [Self::Superadmin, Self::Admin, Self::Cashier, Self::Scanner];
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Superadmin => write!(f, "superadmin"),
            Self::Admin => write!(f, "admin"),
            Self::Cashier => write!(f, "cashier"),
            Self::Scanner => write!(f, "scanner"),
        }
    }
}

impl FromStr for Role {
    type Err = BoxofficeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "superadmin" => Ok(Self::Superadmin),
            "admin" => Ok(Self::Admin),
            "cashier" => Ok(Self::Cashier),
            "scanner" => Ok(Self::Scanner),
            other => Err(BoxofficeError::Configuration(format!("unknown role: {other}"))),
        }
    }
}

/// Actions a role may be allowed to perform.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Permission {
    #[serde(rename = "reservations.view")]
    ReservationsView,
    #[serde(rename = "reservations.edit")]
    ReservationsEdit,
    #[serde(rename = "reservations.delete")]
    ReservationsDelete,
    #[serde(rename = "payments.add")]
    PaymentsAdd,
    #[serde(rename = "payments.edit")]
    PaymentsEdit,
    #[serde(rename = "payments.delete")]
    PaymentsDelete,
    #[serde(rename = "payments.view")]
    PaymentsView,
    #[serde(rename = "tickets.generate")]
    TicketsGenerate,
    #[serde(rename = "tickets.view")]
    TicketsView,
    #[serde(rename = "scan.validate")]
    ScanValidate,
    #[serde(rename = "packs.manage")]
    PacksManage,
    #[serde(rename = "users.manage")]
    UsersManage,
}

impl Permission {
    pub const ALL: [Self; 12] = [
        Self::ReservationsView,
        Self::ReservationsEdit,
        Self::ReservationsDelete,
        Self::PaymentsAdd,
        Self::PaymentsEdit,
        Self::PaymentsDelete,
        Self::PaymentsView,
        Self::TicketsGenerate,
        Self::TicketsView,
        Self::ScanValidate,
        Self::PacksManage,
        Self::UsersManage,
    ];

    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::ReservationsView => "reservations.view",
            Self::ReservationsEdit => "reservations.edit",
            Self::ReservationsDelete => "reservations.delete",
            Self::PaymentsAdd => "payments.add",
            Self::PaymentsEdit => "payments.edit",
            Self::PaymentsDelete => "payments.delete",
            Self::PaymentsView => "payments.view",
            Self::TicketsGenerate => "tickets.generate",
            Self::TicketsView => "tickets.view",
            Self::ScanValidate => "scan.validate",
            Self::PacksManage => "packs.manage",
            Self::UsersManage => "users.manage",
        }
    }
}

impl std::fmt::Display for Permission {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Permission {
    type Err = BoxofficeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|p| p.as_str() == s)
            .ok_or_else(|| BoxofficeError::Configuration(format!("unknown permission: {s}")))
    }
}

/// Immutable role → permission map.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PermissionTable {
    grants: HashMap<Role, HashSet<Permission>>,
}

impl PermissionTable {
    /// Build a table from explicit grants. Roles not listed get nothing.
    #[must_use]
    pub fn from_grants<I, P>(grants: I) -> Self
    where
        I: IntoIterator<Item = (Role, P)>,
        P: IntoIterator<Item = Permission>,
    {
        Self {
            grants: grants
                .into_iter()
                .map(|(role, perms)| (role, perms.into_iter().collect()))
                .collect(),
        }
    }

    /// Pure authorization check.
    #[must_use]
    pub fn has_permission(&self, role: Role, permission: Permission) -> bool {
        self.grants
            .get(&role)
            .is_some_and(|perms| perms.contains(&permission))
    }

    /// # Errors
    /// Returns `PermissionDenied` if `role` lacks `permission`.
    pub fn check(&self, role: Role, permission: Permission) -> crate::Result<()> {
        if self.has_permission(role, permission) {
            Ok(())
        } else {
            Err(BoxofficeError::PermissionDenied { role, permission })
        }
    }
}

impl Default for PermissionTable {
    /// The standard staff matrix.
    fn default() -> Self {
        use Permission::{
            PacksManage, PaymentsAdd, PaymentsDelete, PaymentsEdit, PaymentsView,
            ReservationsDelete, ReservationsEdit, ReservationsView, ScanValidate, TicketsGenerate,
            TicketsView, UsersManage,
        };
        let admin = vec![
            ReservationsView,
            ReservationsEdit,
            ReservationsDelete,
            PaymentsAdd,
            PaymentsEdit,
            PaymentsDelete,
            TicketsGenerate,
            TicketsView,
            ScanValidate,
            PacksManage,
            UsersManage,
        ];
        let mut superadmin = admin.clone();
        superadmin.push(PaymentsView);

        Self::from_grants([
            (Role::Superadmin, superadmin),
            (Role::Admin, admin),
            (
                Role::Cashier,
                vec![ReservationsView, ReservationsEdit, PaymentsAdd, TicketsView],
            ),
            (Role::Scanner, vec![TicketsView, ScanValidate]),
        ])
    }
}
