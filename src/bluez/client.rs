use super::{
    signal::Subscription, Config, DbusTransport, MatchSpec, Transport, PROPERTIES_CHANGED,
    PROPERTIES_INTERFACE,
};
use crate::Result;
use serde::{de::DeserializeOwned, Serialize};
use std::collections::HashMap;
use zvariant::{DynamicType, ObjectPath, OwnedValue, Type, Value};

/// Bus handle scoped to one object path and interface.
#[derive(Clone, Debug)]
pub struct Client<T = DbusTransport> {
    config: Config,
    transport: T,
}

impl Client {
    /// Opens a connection to the bus named in `config`.
    pub async fn connect(config: Config) -> Result<Self> {
        let transport = DbusTransport::connect(config.bus).await?;
        Ok(Self::new(config, transport))
    }
}

impl<T> Client<T> {
    pub fn new(config: Config, transport: T) -> Self {
        Self { config, transport }
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }
}

impl<T: Transport> Client<T> {
    /// Calls `method` on the bound interface.
    pub async fn call<A, R>(&self, method: &str, args: &A) -> Result<R>
    where
        A: Serialize + DynamicType + Sync + std::fmt::Debug,
        R: DeserializeOwned + Type + Send + std::fmt::Debug,
    {
        self.call_with_interface(&self.config.iface, method, args)
            .await
    }

    async fn call_with_interface<A, R>(&self, interface: &str, method: &str, args: &A) -> Result<R>
    where
        A: Serialize + DynamicType + Sync + std::fmt::Debug,
        R: DeserializeOwned + Type + Send + std::fmt::Debug,
    {
        let path = &self.config.path;
        tracing::trace!("{}: {}.{} {:?}", path, interface, method, args);
        let result = self
            .transport
            .call(&self.config.name, path, interface, method, args)
            .await;
        tracing::trace!("{}: {}.{} (...) -> {:?}", path, interface, method, result);
        result
    }

    pub async fn get_property(&self, name: &str) -> Result<OwnedValue> {
        self.call_with_interface(PROPERTIES_INTERFACE, "Get", &(self.config.iface.as_str(), name))
            .await
    }

    pub async fn set_property(&self, name: &str, value: &Value<'_>) -> Result<()> {
        self.call_with_interface(
            PROPERTIES_INTERFACE,
            "Set",
            &(self.config.iface.as_str(), name, value),
        )
        .await
    }

    pub async fn get_all(&self) -> Result<HashMap<String, OwnedValue>> {
        self.call_with_interface(PROPERTIES_INTERFACE, "GetAll", &(self.config.iface.as_str(),))
            .await
    }

    /// Registers for `PropertiesChanged` signals emitted by `path`.
    pub async fn register(&self, path: &ObjectPath<'_>) -> Result<Subscription> {
        let spec = MatchSpec::new(PROPERTIES_INTERFACE)
            .member(PROPERTIES_CHANGED)
            .path(path.to_owned())
            .sender(&self.config.name);
        let stream = self.transport.subscribe(&spec).await?;
        tracing::debug!("{}: registered for {}", path, PROPERTIES_CHANGED);
        Ok(Subscription::spawn(stream))
    }
}
