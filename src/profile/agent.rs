use crate::{
    bluez::{Client, Config, DbusTransport, ObjectManager, Properties, RemoteObject, Transport},
    Result,
};
use std::collections::HashMap;
use zvariant::{ObjectPath, OwnedObjectPath, OwnedValue, Value};

pub const AGENT1_INTERFACE: &str = "org.bluez.Agent1";

/// `org.bluez.Agent1` has no properties.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Agent1Properties;

impl Properties for Agent1Properties {
    const INTERFACE: &'static str = AGENT1_INTERFACE;

    fn update(&mut self, _name: &str, _value: &Value<'_>) -> Result<bool> {
        Ok(false)
    }

    fn to_map(&self) -> Result<HashMap<String, OwnedValue>> {
        Ok(HashMap::new())
    }
}

/// Pairing agent exported by some other bus client.
///
/// The daemon's `Rejected`/`Canceled` errors come back unchanged, see
/// [`Error::remote_name`](crate::Error::remote_name).
#[derive(derive_more::Deref, derive_more::DerefMut, Debug)]
pub struct Agent1<T = DbusTransport>(RemoteObject<Agent1Properties, T>);

impl Agent1 {
    /// `service` is the unique or well-known name of the agent's owner,
    /// `path` whatever path it registered the agent under.
    pub async fn new(service: &str, path: impl Into<OwnedObjectPath>) -> Result<Self> {
        let config = Config::new(service, AGENT1_INTERFACE, path);
        Ok(Self(RemoteObject::connect(config).await?))
    }
}

impl<T: Transport> Agent1<T> {
    pub async fn with_transport(
        service: &str,
        path: impl Into<OwnedObjectPath>,
        transport: T,
    ) -> Result<Self> {
        let client = Client::new(Config::new(service, AGENT1_INTERFACE, path), transport);
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

    /// Called when the daemon unregisters the agent.
    pub async fn release(&self) -> Result<()> {
        self.client().call("Release", &()).await
    }

    /// Asks for a 1-16 character alphanumeric PIN.
    pub async fn request_pin_code(&self, device: &ObjectPath<'_>) -> Result<String> {
        self.client().call("RequestPinCode", &(device,)).await
    }

    /// Asks the agent to show `pincode` to the user, for legacy keyboards.
    pub async fn display_pin_code(&self, device: &ObjectPath<'_>, pincode: &str) -> Result<()> {
        self.client()
            .call("DisplayPinCode", &(device, pincode))
            .await
    }

    /// Asks for a numeric passkey in 0..=999999.
    pub async fn request_passkey(&self, device: &ObjectPath<'_>) -> Result<u32> {
        self.client().call("RequestPasskey", &(device,)).await
    }

    /// `entered` is the number of keys already typed on the remote side. May
    /// be called repeatedly during one pairing.
    pub async fn display_passkey(
        &self,
        device: &ObjectPath<'_>,
        passkey: u32,
        entered: u16,
    ) -> Result<()> {
        self.client()
            .call("DisplayPasskey", &(device, passkey, entered))
            .await
    }

    pub async fn request_confirmation(&self, device: &ObjectPath<'_>, passkey: u32) -> Result<()> {
        self.client()
            .call("RequestConfirmation", &(device, passkey))
            .await
    }

    /// Authorizes an incoming just-works or cable pairing.
    pub async fn request_authorization(&self, device: &ObjectPath<'_>) -> Result<()> {
        self.client()
            .call("RequestAuthorization", &(device,))
            .await
    }

    pub async fn authorize_service(&self, device: &ObjectPath<'_>, uuid: &str) -> Result<()> {
        self.client()
            .call("AuthorizeService", &(device, uuid))
            .await
    }

    /// The request failed before the agent replied.
    pub async fn cancel(&self) -> Result<()> {
        self.client().call("Cancel", &()).await
    }
}
