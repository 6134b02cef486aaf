use super::{
    signal::{Listener, Signal, SignalReceiver, Subscription},
    Client, Config, DbusTransport, ObjectManager, Properties, PropertyCache, Transport,
    PROPERTIES_CHANGED, PROPERTIES_INTERFACE,
};
use crate::Result;
use std::{collections::HashMap, sync::Arc};
use tokio::{sync::RwLock, task::JoinHandle};
use zbus::Message;
use zvariant::{ObjectPath, OwnedObjectPath, OwnedValue, Value};

/// One property update, decoded from `PropertiesChanged`.
#[derive(Debug)]
pub struct PropertyChanged {
    pub path: OwnedObjectPath,
    pub interface: String,
    pub name: String,
    pub value: OwnedValue,
}

struct PropertiesSignal {
    subscription: Subscription,
    /// Raw channel, only created once asked for.
    primary: Option<Listener>,
}

struct Watch {
    tx: flume::Sender<Signal<PropertyChanged>>,
    /// Identifies the watch in `unwatch_properties`. The translator stops once
    /// this is the last receiver left.
    rx: SignalReceiver<PropertyChanged>,
    tap: u64,
    translator: JoinHandle<()>,
}

/// A bound interface on a remote object: client handle, property cache and
/// signal relays. Interface specific bindings wrap this with their methods.
pub struct RemoteObject<P, T = DbusTransport> {
    client: Client<T>,
    properties: PropertyCache<P>,
    properties_signal: Option<PropertiesSignal>,
    watches: Vec<Watch>,
    object_manager: Option<ObjectManager<T>>,
    object_manager_signal: Option<Listener>,
}

impl<P: Properties> RemoteObject<P> {
    pub async fn connect(config: Config) -> Result<Self> {
        Self::with_client(Client::connect(config).await?).await
    }
}

impl<P: Properties, T: Transport> RemoteObject<P, T> {
    /// Binds to the object and loads its properties. Fails if the object or
    /// the interface doesn't exist.
    pub async fn with_client(client: Client<T>) -> Result<Self> {
        let object = Self {
            client,
            properties: Arc::new(RwLock::new(P::default())),
            properties_signal: None,
            watches: Vec::new(),
            object_manager: None,
            object_manager_signal: None,
        };
        object.get_properties().await?;
        Ok(object)
    }

    /// Uses `object_manager` for [`object_manager_signal`](Self::object_manager_signal)
    /// instead of creating a private one, so many bindings share one bus
    /// subscription.
    pub fn with_object_manager(mut self, object_manager: ObjectManager<T>) -> Self {
        self.object_manager = Some(object_manager);
        self
    }

    pub fn path(&self) -> &ObjectPath<'static> {
        &self.client.config().path
    }

    pub fn interface(&self) -> &str {
        &self.client.config().iface
    }

    pub fn client(&self) -> &Client<T> {
        &self.client
    }

    /// Handle to the property cache.
    pub fn cache(&self) -> PropertyCache<P> {
        self.properties.clone()
    }

    /// Snapshot of the cached properties.
    pub async fn properties(&self) -> P {
        self.properties.read().await.clone()
    }

    /// Reloads every property. The cache stays write-locked for the whole
    /// fetch.
    pub async fn get_properties(&self) -> Result<P> {
        let mut props = self.properties.write().await;
        let all = self.client.get_all().await?;
        props.merge(&all)?;
        Ok(props.clone())
    }

    pub async fn get_property(&self, name: &str) -> Result<OwnedValue> {
        self.client.get_property(name).await
    }

    pub async fn set_property(&self, name: &str, value: &Value<'_>) -> Result<()> {
        self.client.set_property(name, value).await?;
        self.properties.write().await.update(name, value)?;
        Ok(())
    }

    async fn properties_subscription(&mut self) -> Result<&mut PropertiesSignal> {
        let signal = match self.properties_signal.take() {
            Some(signal) => signal,
            None => PropertiesSignal {
                subscription: self.client.register(self.path()).await?,
                primary: None,
            },
        };
        Ok(self.properties_signal.insert(signal))
    }

    /// Channel of raw `PropertiesChanged` signals for this object. Repeated
    /// calls return the same channel.
    pub async fn properties_signal(&mut self) -> Result<SignalReceiver> {
        let signal = self.properties_subscription().await?;
        let primary = signal
            .primary
            .get_or_insert_with(|| signal.subscription.listen());
        Ok(primary.receiver().clone())
    }

    /// Sends the sentinel on the properties channel and deregisters.
    /// Watchers stop as well.
    pub async fn unregister_properties_signal(&mut self) {
        for watch in self.watches.drain(..) {
            watch.stop().await;
        }
        if let Some(signal) = self.properties_signal.take() {
            signal.subscription.cancel().await;
            tracing::debug!("{}: unregistered from {}", self.path(), PROPERTIES_CHANGED);
        }
    }

    /// Channel of `InterfacesAdded`/`InterfacesRemoved` signals. Repeated
    /// calls return the same channel.
    pub async fn object_manager_signal(&mut self) -> Result<SignalReceiver> {
        if let Some(ref listener) = self.object_manager_signal {
            return Ok(listener.receiver().clone());
        }
        let object_manager = self
            .object_manager
            .get_or_insert_with(|| ObjectManager::new(self.client.transport().clone()));
        let listener = object_manager.register().await?;
        let rx = listener.receiver().clone();
        self.object_manager_signal = Some(listener);
        Ok(rx)
    }

    pub async fn cancel_object_manager_signal(&mut self) {
        if let (Some(listener), Some(object_manager)) =
            (self.object_manager_signal.take(), self.object_manager.as_ref())
        {
            object_manager.unregister(&listener).await;
        }
    }

    /// Starts a translator decoding this object's `PropertiesChanged`
    /// signals into [`PropertyChanged`] events. Every change is applied to the
    /// cache before it is published.
    pub async fn watch_properties(&mut self) -> Result<SignalReceiver<PropertyChanged>> {
        self.prune_watches();
        let path: OwnedObjectPath = self.path().to_owned().into();
        let interface = self.interface().to_owned();
        let cache = self.properties.clone();
        let tap = self.properties_subscription().await?.subscription.listen();

        let (tx, rx) = flume::unbounded();
        let translator = tokio::spawn(translate(
            tap.clone().into_receiver(),
            tx.clone(),
            cache,
            path,
            interface,
        ));
        self.watches.push(Watch {
            tx,
            rx: rx.clone(),
            tap: tap.id(),
            translator,
        });
        Ok(rx)
    }

    /// Stops the watcher feeding `rx` and ends `rx` with the sentinel.
    pub async fn unwatch_properties(&mut self, rx: &SignalReceiver<PropertyChanged>) -> bool {
        self.prune_watches();
        let Some(pos) = self.watches.iter().position(|w| w.rx.same_channel(rx)) else {
            return false;
        };
        let watch = self.watches.remove(pos);
        if let Some(ref signal) = self.properties_signal {
            signal.subscription.unlisten(watch.tap);
        }
        watch.stop().await;
        true
    }

    /// Forgets watchers whose caller dropped the receiver.
    fn prune_watches(&mut self) {
        let (gone, live): (Vec<_>, Vec<_>) = std::mem::take(&mut self.watches)
            .into_iter()
            .partition(|w| w.rx.receiver_count() <= 1);
        self.watches = live;
        for watch in gone {
            if let Some(ref signal) = self.properties_signal {
                signal.subscription.unlisten(watch.tap);
            }
            watch.translator.abort();
        }
    }

    /// Stops watchers, drops both subscriptions and releases the connection.
    pub async fn close(mut self) {
        self.unregister_properties_signal().await;
        self.cancel_object_manager_signal().await;
        tracing::debug!("{}: closed {}", self.path(), self.interface());
    }
}

impl Watch {
    async fn stop(self) {
        self.translator.abort();
        let _ = self.translator.await;
        let _ = self.tx.send(Signal::Unsubscribed);
    }
}

impl<P, T> std::fmt::Debug for RemoteObject<P, T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RemoteObject")
            .field("path", &self.client.config().path)
            .field("interface", &self.client.config().iface)
            .field("subscribed", &self.properties_signal.is_some())
            .field("watches", &self.watches.len())
            .finish()
    }
}

/// Decodes one `PropertiesChanged` message if it was sent by `path` for
/// `interface`.
fn decode_properties_changed(
    msg: &Message,
    path: &ObjectPath<'_>,
    interface: &str,
) -> Result<Option<HashMap<String, OwnedValue>>> {
    let header = msg.header();
    if header.interface().map(|i| i.as_str()) != Some(PROPERTIES_INTERFACE)
        || header.member().map(|m| m.as_str()) != Some(PROPERTIES_CHANGED)
        || header.path().map(|p| p.as_str()) != Some(path.as_str())
    {
        return Ok(None);
    }
    let (iface, changed, invalidated) = msg
        .body()
        .deserialize::<(String, HashMap<String, OwnedValue>, Vec<String>)>()?;
    if iface != interface {
        return Ok(None);
    }
    if !invalidated.is_empty() {
        tracing::trace!("{}: invalidated {:?}", path, invalidated);
    }
    Ok(Some(changed))
}

async fn translate<P: Properties>(
    source: SignalReceiver,
    sink: flume::Sender<Signal<PropertyChanged>>,
    cache: PropertyCache<P>,
    path: OwnedObjectPath,
    interface: String,
) {
    while let Ok(Signal::Received(msg)) = source.recv_async().await {
        let changed = match decode_properties_changed(&msg, &path, &interface) {
            Ok(Some(changed)) => changed,
            Ok(None) => continue,
            Err(e) => {
                tracing::warn!("{}: dropping malformed {}: {}", path, PROPERTIES_CHANGED, e);
                continue;
            }
        };
        for (name, value) in changed {
            if let Err(e) = cache.write().await.update(&name, &value) {
                tracing::warn!("{}: not caching {}: {}", path, name, e);
            }
            let event = PropertyChanged {
                path: path.clone(),
                interface: interface.clone(),
                name,
                value,
            };
            if sink.receiver_count() <= 1 || sink.send(Signal::Received(event)).is_err() {
                tracing::debug!("{}: watcher dropped", path);
                return;
            }
        }
    }
    tracing::debug!("{}: property translator stopped", path);
}
