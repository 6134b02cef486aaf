#[derive(thiserror::Error, Debug)]
pub enum Error {
    #[error(transparent)]
    Dbus(#[from] zbus::Error),

    #[error(transparent)]
    Variant(#[from] zvariant::Error),

    #[error("Property {name} has signature `{found}`, expected `{expected}`")]
    PropertyType {
        name: String,
        expected: &'static str,
        found: String,
    },

    #[error("Invalid bluetooth address `{0}`")]
    InvalidAddress(String),

    #[error("Object path `{0}` does not belong to a bluetooth device")]
    NotADevice(String),
}

impl Error {
    /// Name of the D-Bus error the remote side replied with, e.g.
    /// `org.bluez.Error.Rejected`.
    pub fn remote_name(&self) -> Option<&str> {
        match self {
            Error::Dbus(zbus::Error::MethodError(name, _, _)) => Some(name.as_str()),
            _ => None,
        }
    }
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
