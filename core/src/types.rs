//! Shared primitive types used across the entire engine.

use serde::{Deserialize, Serialize};

/// A stable pharmacy identifier from the record store.
pub type PharmacyId = u32;

/// The three staffing roles tracked in payroll data.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Role {
    /// F: pharmacist.
    Pharmacist,
    /// L: pharmacy assistant.
    Assistant,
    /// ZF: deputy pharmacist.
    Deputy,
}

impl Role {
    pub const ALL: [Role; 3] = [Role::Pharmacist, Role::Assistant, Role::Deputy];

    /// Payroll column code.
    pub fn code(&self) -> &'static str {
        match self {
            Role::Pharmacist => "F",
            Role::Assistant  => "L",
            Role::Deputy     => "ZF",
        }
    }
}

/// One value per role. Used for staff counts, proportions and factors alike.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct RoleBreakdown {
    #[serde(rename = "F")]
    pub pharmacist: f64,
    #[serde(rename = "L")]
    pub assistant:  f64,
    #[serde(rename = "ZF")]
    pub deputy:     f64,
}

impl RoleBreakdown {
    pub const fn new(pharmacist: f64, assistant: f64, deputy: f64) -> Self {
        Self { pharmacist, assistant, deputy }
    }

    pub fn get(&self, role: Role) -> f64 {
        match role {
            Role::Pharmacist => self.pharmacist,
            Role::Assistant  => self.assistant,
            Role::Deputy     => self.deputy,
        }
    }

    pub fn total(&self) -> f64 {
        self.pharmacist + self.assistant + self.deputy
    }

    pub fn scale(&self, k: f64) -> Self {
        self.map(|v| v * k)
    }

    pub fn map(&self, f: impl Fn(f64) -> f64) -> Self {
        Self::new(f(self.pharmacist), f(self.assistant), f(self.deputy))
    }

    /// Element-wise combination of two breakdowns.
    pub fn zip(&self, other: &Self, f: impl Fn(f64, f64) -> f64) -> Self {
        Self::new(
            f(self.pharmacist, other.pharmacist),
            f(self.assistant, other.assistant),
            f(self.deputy, other.deputy),
        )
    }

    pub fn is_non_negative(&self) -> bool {
        Role::ALL.iter().all(|r| {
            let v = self.get(*r);
            v.is_finite() && v >= 0.0
        })
    }
}

/// Round half away from zero to `decimals` places.
pub fn round_to(value: f64, decimals: i32) -> f64 {
    let k = 10f64.powi(decimals);
    (value * k).round() / k
}
