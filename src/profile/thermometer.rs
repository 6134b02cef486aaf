use crate::{
    bluez::{
        BluetoothAddress, Client, Config, DbusTransport, ObjectManager, Properties, PropertyValue,
        RemoteObject, Transport, SERVICE,
    },
    Result,
};
use std::collections::HashMap;
use zvariant::{OwnedObjectPath, OwnedValue, Value};

pub const THERMOMETER1_INTERFACE: &str = "org.bluez.Thermometer1";

/// Health Thermometer profile properties.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Thermometer1Properties {
    /// Whether the thermometer can notify intermediate measurements.
    pub intermediate: bool,
    /// Seconds between periodic measurements, 0 disables them. Optional.
    pub interval: u16,
    /// Upper bound for `interval`. Optional.
    pub maximum: u16,
    /// Lower bound for `interval`. Optional.
    pub minimum: u16,
}

impl Properties for Thermometer1Properties {
    const INTERFACE: &'static str = THERMOMETER1_INTERFACE;

    fn update(&mut self, name: &str, value: &Value<'_>) -> Result<bool> {
        match name {
            "Intermediate" => self.intermediate = bool::from_value(name, value)?,
            "Interval" => self.interval = u16::from_value(name, value)?,
            "Maximum" => self.maximum = u16::from_value(name, value)?,
            "Minimum" => self.minimum = u16::from_value(name, value)?,
            _ => return Ok(false),
        }
        Ok(true)
    }

    fn to_map(&self) -> Result<HashMap<String, OwnedValue>> {
        let mut map = HashMap::new();
        map.insert("Intermediate".to_owned(), self.intermediate.to_owned_value()?);
        map.insert("Interval".to_owned(), self.interval.to_owned_value()?);
        map.insert("Maximum".to_owned(), self.maximum.to_owned_value()?);
        map.insert("Minimum".to_owned(), self.minimum.to_owned_value()?);
        Ok(map)
    }
}

#[derive(derive_more::Deref, derive_more::DerefMut, Debug)]
pub struct Thermometer1<T = DbusTransport>(RemoteObject<Thermometer1Properties, T>);

impl Thermometer1 {
    /// `path` looks like `/org/bluez/hci0/dev_XX_XX_XX_XX_XX_XX`.
    pub async fn new(path: impl Into<OwnedObjectPath>) -> Result<Self> {
        let config = Config::new(SERVICE, THERMOMETER1_INTERFACE, path);
        Ok(Self(RemoteObject::connect(config).await?))
    }
}

impl<T: Transport> Thermometer1<T> {
    pub async fn with_transport(path: impl Into<OwnedObjectPath>, transport: T) -> Result<Self> {
        let client = Client::new(
            Config::new(SERVICE, THERMOMETER1_INTERFACE, path),
            transport,
        );
        Ok(Self(RemoteObject::with_client(client).await?))
    }

    /// Shares `object_manager` with other bindings, see
    /// [`RemoteObject::with_object_manager`].
    pub fn with_object_manager(self, object_manager: ObjectManager<T>) -> Self {
        Self(self.0.with_object_manager(object_manager))
    }

    pub async fn close(self) {
        self.0.close().await
    }

    /// Address of the device this thermometer belongs to.
    pub fn device_address(&self) -> Result<BluetoothAddress> {
        BluetoothAddress::from_object_path(self.path().as_str())
    }

    async fn get<V: PropertyValue>(&self, name: &str) -> Result<V> {
        let value = self.get_property(name).await?;
        V::from_value(name, &value)
    }

    pub async fn intermediate(&self) -> Result<bool> {
        self.get("Intermediate").await
    }

    pub async fn interval(&self) -> Result<u16> {
        self.get("Interval").await
    }

    pub async fn set_interval(&self, interval: u16) -> Result<()> {
        self.set_property("Interval", &Value::from(interval)).await
    }

    pub async fn maximum(&self) -> Result<u16> {
        self.get("Maximum").await
    }

    pub async fn minimum(&self) -> Result<u16> {
        self.get("Minimum").await
    }
}
