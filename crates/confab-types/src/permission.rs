//! Permission model for tool authorization.
//!
//! A caller (the session, acting for its tenant) carries a granted
//! permission set; every tool declares a required set. Authorization is
//! a pure superset check performed in the gateway pipeline — it is
//! never delegated to any probabilistic component.
//!
//! ```text
//! authorized ⇔ granted ⊇ required
//! ```
//!
//! # Example
//!
//! ```
//! use confab_types::Permission;
//!
//! let granted = Permission::DATA_READ | Permission::COMMUNICATION;
//!
//! assert!(granted.grants(Permission::DATA_READ));
//! assert!(!granted.grants(Permission::PAYMENT));
//! assert!(!granted.grants(Permission::DATA_READ | Permission::PAYMENT));
//! ```

use bitflags::bitflags;
use serde::{Deserialize, Serialize};

bitflags! {
    /// Permissions a session can hold and a tool can require.
    ///
    /// | Permission | Gates |
    /// |------------|-------|
    /// | [`DATA_READ`](Self::DATA_READ) | lookups, availability checks |
    /// | [`DATA_WRITE`](Self::DATA_WRITE) | bookings, record updates |
    /// | [`PAYMENT`](Self::PAYMENT) | charges, refunds |
    /// | [`COMMUNICATION`](Self::COMMUNICATION) | outbound SMS/email |
    /// | [`ESCALATION`](Self::ESCALATION) | human handoff, queue jumps |
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
    pub struct Permission: u16 {
        /// Read external data: lookups, availability, account status.
        const DATA_READ     = 0b0000_0001;
        /// Mutate external data: create/update bookings and records.
        const DATA_WRITE    = 0b0000_0010;
        /// Move money: charges, refunds, holds.
        const PAYMENT       = 0b0000_0100;
        /// Contact the user out-of-band: SMS, email.
        const COMMUNICATION = 0b0000_1000;
        /// Escalate to a human operator.
        const ESCALATION    = 0b0001_0000;
    }
}

impl Permission {
    /// All permissions.
    pub const ALL: Self = Self::all();

    /// Returns `true` if this set grants everything in `required`.
    ///
    /// This is the authorization check: the granted set must be a
    /// superset of the required set. An empty required set is always
    /// granted.
    #[must_use]
    pub fn grants(self, required: Self) -> bool {
        self.contains(required)
    }

    /// Returns a human-readable list of permission names.
    ///
    /// # Example
    ///
    /// ```
    /// use confab_types::Permission;
    ///
    /// let set = Permission::DATA_READ | Permission::PAYMENT;
    /// let names = set.names();
    /// assert!(names.contains(&"DATA_READ"));
    /// assert!(names.contains(&"PAYMENT"));
    /// ```
    #[must_use]
    pub fn names(self) -> Vec<&'static str> {
        let mut names = Vec::new();
        if self.contains(Self::DATA_READ) {
            names.push("DATA_READ");
        }
        if self.contains(Self::DATA_WRITE) {
            names.push("DATA_WRITE");
        }
        if self.contains(Self::PAYMENT) {
            names.push("PAYMENT");
        }
        if self.contains(Self::COMMUNICATION) {
            names.push("COMMUNICATION");
        }
        if self.contains(Self::ESCALATION) {
            names.push("ESCALATION");
        }
        names
    }
}
