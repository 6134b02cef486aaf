mod address;
mod client;
mod object_manager;
mod properties;
mod remote;
pub mod signal;
mod transport;

#[cfg(test)]
pub(crate) mod testing;

pub use address::BluetoothAddress;
pub use client::Client;
pub use object_manager::{ObjectManager, ObjectManagerEvent};
pub use properties::{Properties, PropertyCache, PropertyValue};
pub use remote::{PropertyChanged, RemoteObject};
pub use transport::{DbusTransport, MatchSpec, Transport};

use zvariant::OwnedObjectPath;

pub const SERVICE: &str = "org.bluez";

pub const PROPERTIES_INTERFACE: &str = "org.freedesktop.DBus.Properties";
pub const PROPERTIES_CHANGED: &str = "PropertiesChanged";

pub const OBJECT_MANAGER_INTERFACE: &str = "org.freedesktop.DBus.ObjectManager";
pub const INTERFACES_ADDED: &str = "InterfacesAdded";
pub const INTERFACES_REMOVED: &str = "InterfacesRemoved";

#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, serde::Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BusKind {
    #[default]
    System,
    Session,
}

/// Addresses one interface of one remote object.
#[derive(Clone, Debug, PartialEq, serde::Deserialize)]
pub struct Config {
    /// Bus name of the service exposing the object.
    pub name: String,
    pub iface: String,
    pub path: OwnedObjectPath,
    #[serde(default)]
    pub bus: BusKind,
}

impl Config {
    pub fn new(name: &str, iface: &str, path: impl Into<OwnedObjectPath>) -> Self {
        Self {
            name: name.to_owned(),
            iface: iface.to_owned(),
            path: path.into(),
            bus: BusKind::System,
        }
    }
}
