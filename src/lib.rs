//! Client bindings for BlueZ D-Bus interfaces.
//!
//! Each binding ([`profile::Agent1`], [`profile::Thermometer1`]) is a thin
//! typed layer over [`bluez::RemoteObject`], which holds the bus client, the
//! property cache and the signal relays shared by every interface.
//!
//! ```no_run
//! # async fn run() -> bluez_profiles::Result<()> {
//! use bluez_profiles::{bluez::signal::Signal, profile::Thermometer1};
//! use zvariant::OwnedObjectPath;
//!
//! let path = OwnedObjectPath::try_from("/org/bluez/hci0/dev_00_11_22_33_FF_EE")?;
//! let mut thermo = Thermometer1::new(path).await?;
//! let changes = thermo.watch_properties().await?;
//! while let Ok(Signal::Received(change)) = changes.recv_async().await {
//!     tracing::info!("{} changed, interval now {}", change.name, thermo.properties().await.interval);
//! }
//! thermo.close().await;
//! # Ok(())
//! # }
//! ```

pub mod bluez;
mod error;
pub mod profile;

pub use error::{Error, Result};
