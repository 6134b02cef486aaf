use super::{
    signal::{Listener, Subscription},
    MatchSpec, Transport, INTERFACES_ADDED, INTERFACES_REMOVED, OBJECT_MANAGER_INTERFACE, SERVICE,
};
use crate::Result;
use std::{collections::HashMap, sync::Arc};
use tokio::sync::Mutex;
use zbus::Message;
use zvariant::{ObjectPath, OwnedObjectPath, OwnedValue};

pub type InterfaceMap = HashMap<String, HashMap<String, OwnedValue>>;

/// Shared registry for the daemon's `InterfacesAdded`/`InterfacesRemoved`
/// signals.
///
/// However many bindings register, there is at most one bus subscription.
/// It is created by the first [`register`](Self::register) and torn down by
/// the last [`unregister`](Self::unregister). Clones share the registry.
#[derive(Clone)]
pub struct ObjectManager<T> {
    transport: T,
    service: Arc<str>,
    subscription: Arc<Mutex<Option<Subscription>>>,
}

impl<T: Transport> ObjectManager<T> {
    pub fn new(transport: T) -> Self {
        Self::for_service(transport, SERVICE)
    }

    pub fn for_service(transport: T, service: &str) -> Self {
        Self {
            transport,
            service: service.into(),
            subscription: Arc::new(Mutex::new(None)),
        }
    }

    pub async fn get_managed_objects(&self) -> Result<HashMap<OwnedObjectPath, InterfaceMap>> {
        let root = ObjectPath::from_static_str_unchecked("/");
        self.transport
            .call(
                &self.service,
                &root,
                OBJECT_MANAGER_INTERFACE,
                "GetManagedObjects",
                &(),
            )
            .await
    }

    pub async fn register(&self) -> Result<Listener> {
        let mut subscription = self.subscription.lock().await;
        match *subscription {
            Some(ref sub) if !sub.is_closed() => return Ok(sub.listen()),
            Some(_) => {
                tracing::debug!("Replacing closed {} subscription", OBJECT_MANAGER_INTERFACE)
            }
            None => {}
        }
        let spec = MatchSpec::new(OBJECT_MANAGER_INTERFACE)
            .path(ObjectPath::from_static_str_unchecked("/"))
            .sender(&self.service);
        let stream = self.transport.subscribe(&spec).await?;
        tracing::debug!("Registered for {} signals", OBJECT_MANAGER_INTERFACE);
        let sub = Subscription::spawn(stream);
        let listener = sub.listen();
        *subscription = Some(sub);
        Ok(listener)
    }

    /// Ends `listener`'s channel with the sentinel. Returns false if it wasn't
    /// registered here.
    pub async fn unregister(&self, listener: &Listener) -> bool {
        let mut subscription = self.subscription.lock().await;
        let Some(ref sub) = *subscription else {
            return false;
        };
        if !sub.unlisten(listener.id()) {
            return false;
        }
        if sub.listeners() == 0 {
            if let Some(sub) = subscription.take() {
                sub.cancel().await;
                tracing::debug!("Unregistered from {} signals", OBJECT_MANAGER_INTERFACE);
            }
        }
        true
    }

    pub async fn registered(&self) -> usize {
        self.subscription
            .lock()
            .await
            .as_ref()
            .map_or(0, Subscription::listeners)
    }
}

impl<T> std::fmt::Debug for ObjectManager<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ObjectManager")
            .field("service", &self.service)
            .finish()
    }
}

#[derive(Debug)]
pub enum ObjectManagerEvent {
    InterfacesAdded {
        path: OwnedObjectPath,
        interfaces: InterfaceMap,
    },
    InterfacesRemoved {
        path: OwnedObjectPath,
        interfaces: Vec<String>,
    },
}

impl ObjectManagerEvent {
    /// Decodes a raw object manager signal. Other messages yield `Ok(None)`.
    pub fn from_message(msg: &Message) -> Result<Option<Self>> {
        let header = msg.header();
        if header.interface().map(|i| i.as_str()) != Some(OBJECT_MANAGER_INTERFACE) {
            return Ok(None);
        }
        let body = msg.body();
        match header.member().map(|m| m.as_str()) {
            Some(INTERFACES_ADDED) => {
                let (path, interfaces) = body.deserialize::<(OwnedObjectPath, InterfaceMap)>()?;
                Ok(Some(Self::InterfacesAdded { path, interfaces }))
            }
            Some(INTERFACES_REMOVED) => {
                let (path, interfaces) = body.deserialize::<(OwnedObjectPath, Vec<String>)>()?;
                Ok(Some(Self::InterfacesRemoved { path, interfaces }))
            }
            _ => Ok(None),
        }
    }

    pub fn path(&self) -> &ObjectPath<'static> {
        match self {
            Self::InterfacesAdded { path, .. } | Self::InterfacesRemoved { path, .. } => path,
        }
    }
}
