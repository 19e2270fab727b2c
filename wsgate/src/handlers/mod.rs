//! Built-in package handlers
//!
//! Registration is an explicit startup step; the router freezes afterwards.

pub mod echo;
pub mod notify;
pub mod whoami;

use std::sync::Arc;

use crate::error::Result;
use crate::ws::frames::PkgId;
use crate::ws::router::PackageRouter;

/// Register every built-in package handler.
///
/// A duplicate registration here is a programmer error and aborts startup.
pub fn register_all(router: &mut PackageRouter) -> Result<()> {
    router.register(PkgId::ECHO, Arc::new(echo::EchoHandler), None, &[])?;
    router.register(PkgId::WHOAMI, Arc::new(whoami::WhoamiHandler), None, &[])?;
    router.register(
        PkgId::NOTIFY,
        Arc::new(notify::NotifyHandler),
        Some(notify::payload_schema()),
        &["admin"],
    )?;

    tracing::info!("Registered {} package handlers", router.len());
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_register_all_is_idempotent_only_once() {
        let mut router = PackageRouter::new();
        register_all(&mut router).unwrap();
        assert_eq!(router.len(), 3);

        // The registry is write-once per package id
        assert!(register_all(&mut router).is_err());
        assert_eq!(router.len(), 3);
    }
}
