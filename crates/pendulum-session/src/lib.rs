// ─────────────────────────────────────────────────────────────────────
// SCPN Cart-Pendulum Rig — Pendulum Session
// © 1998–2026 Miroslav Šotek. All rights reserved.
// Contact: www.anulum.li | protoscience@anulum.li
// ORCID: https://orcid.org/0009-0009-3560-0851
// License: GNU AGPL v3 | Commercial licensing available
// ─────────────────────────────────────────────────────────────────────
//! Serial command protocol, session supervision and the task harness.

pub mod export;
pub mod harness;
pub mod link;
pub mod protocol;
pub mod session;
