//! In-memory bus used by the unit tests.

use super::{MatchSpec, Transport, PROPERTIES_INTERFACE, SERVICE};
use crate::{Error, Result};
use futures_util::stream::{BoxStream, StreamExt};
use serde::{de::DeserializeOwned, Serialize};
use std::{
    collections::HashMap,
    pin::Pin,
    sync::{
        atomic::{AtomicUsize, Ordering},
        Arc, Mutex,
    },
    task::{Context, Poll},
};
use zbus::Message;
use zvariant::{
    serialized::{Context as EncodingContext, Data},
    DynamicType, ObjectPath, OwnedObjectPath, OwnedValue, Type, Value, LE,
};

/// Unique name the fake daemon owning `org.bluez` sends from.
pub(crate) const DAEMON: &str = ":1.1";

pub(crate) fn init_logging() {
    let _ = tracing_subscriber::fmt()
        .with_max_level(tracing::Level::TRACE)
        .with_test_writer()
        .try_init();
}

pub(crate) fn owned(v: impl Into<Value<'static>>) -> OwnedValue {
    OwnedValue::try_from(v.into()).unwrap()
}

pub(crate) fn path(p: &str) -> OwnedObjectPath {
    OwnedObjectPath::try_from(p).unwrap()
}

pub(crate) fn properties_changed(
    path: &str,
    interface: &str,
    name: &str,
    value: impl Into<Value<'static>>,
) -> Message {
    let mut changed = HashMap::new();
    changed.insert(name.to_owned(), value.into());
    Message::signal(path, PROPERTIES_INTERFACE, "PropertiesChanged")
        .unwrap()
        .sender(DAEMON)
        .unwrap()
        .build(&(interface, changed, Vec::<String>::new()))
        .unwrap()
}

fn encode<T: Serialize + DynamicType + ?Sized>(value: &T) -> Result<Data<'static, 'static>> {
    Ok(zvariant::to_bytes(EncodingContext::new_dbus(LE, 0), value)?)
}

/// A recorded method call, arguments kept in wire form.
pub(crate) struct Call {
    pub path: String,
    pub interface: String,
    pub method: String,
    args: Data<'static, 'static>,
}

impl Call {
    pub fn args<T: DeserializeOwned + Type>(&self) -> T {
        self.args.deserialize::<T>().unwrap().0
    }
}

/// Holds calls of one method until released, see [`FakeBus::hold`].
#[derive(Clone)]
struct Gate {
    entered: flume::Sender<()>,
    release: flume::Receiver<()>,
}

pub(crate) struct GateHandle {
    entered: flume::Receiver<()>,
    release: flume::Sender<()>,
}

impl GateHandle {
    /// Waits until a held call has reached the bus.
    pub async fn entered(&self) {
        self.entered.recv_async().await.unwrap();
    }

    /// Lets one held call through.
    pub fn release(&self) {
        self.release.send(()).unwrap();
    }
}

#[derive(Default)]
struct State {
    owners: HashMap<String, String>,
    objects: HashMap<(String, String), HashMap<String, OwnedValue>>,
    gates: HashMap<String, Gate>,
    replies: HashMap<String, Data<'static, 'static>>,
    calls: Vec<Call>,
    subscriptions: Vec<(MatchSpec, flume::Sender<Message>)>,
    fail_subscribe: bool,
}

#[derive(Clone, Default)]
pub(crate) struct FakeBus {
    state: Arc<Mutex<State>>,
    registrations: Arc<AtomicUsize>,
    live: Arc<AtomicUsize>,
}

impl FakeBus {
    pub fn new() -> Self {
        let bus = Self::default();
        bus.state
            .lock()
            .unwrap()
            .owners
            .insert(SERVICE.to_owned(), DAEMON.to_owned());
        bus
    }

    /// Exposes `interface` at `path` with the given properties.
    pub fn add_object(&self, path: &str, interface: &str, props: Vec<(&str, OwnedValue)>) {
        let props = props
            .into_iter()
            .map(|(k, v)| (k.to_owned(), v))
            .collect();
        self.state
            .lock()
            .unwrap()
            .objects
            .insert((path.to_owned(), interface.to_owned()), props);
    }

    /// Changes a property behind the bindings' back, like the daemon would.
    pub fn put_property(&self, path: &str, interface: &str, name: &str, value: OwnedValue) {
        self.state
            .lock()
            .unwrap()
            .objects
            .get_mut(&(path.to_owned(), interface.to_owned()))
            .unwrap()
            .insert(name.to_owned(), value);
    }

    pub fn property(&self, path: &str, interface: &str, name: &str) -> Option<OwnedValue> {
        self.state
            .lock()
            .unwrap()
            .objects
            .get(&(path.to_owned(), interface.to_owned()))
            .and_then(|props| props.get(name))
            .map(|v| v.try_clone().unwrap())
    }

    /// Canned reply for every call of `method`.
    pub fn reply<T: Serialize + DynamicType>(&self, method: &str, value: T) {
        self.state
            .lock()
            .unwrap()
            .replies
            .insert(method.to_owned(), encode(&value).unwrap());
    }

    /// Parks every call of `method` until the returned handle releases it.
    pub fn hold(&self, method: &str) -> GateHandle {
        let (entered_tx, entered_rx) = flume::unbounded();
        let (release_tx, release_rx) = flume::unbounded();
        self.state.lock().unwrap().gates.insert(
            method.to_owned(),
            Gate {
                entered: entered_tx,
                release: release_rx,
            },
        );
        GateHandle {
            entered: entered_rx,
            release: release_tx,
        }
    }

    /// Ends every registration, as if the connection to the bus dropped.
    pub fn close_subscriptions(&self) {
        self.state.lock().unwrap().subscriptions.clear();
    }

    pub fn fail_subscribe(&self) {
        self.state.lock().unwrap().fail_subscribe = true;
    }

    pub fn calls(&self) -> Vec<(String, String, String)> {
        self.state
            .lock()
            .unwrap()
            .calls
            .iter()
            .map(|c| (c.path.clone(), c.interface.clone(), c.method.clone()))
            .collect()
    }

    pub fn with_last_call<R>(&self, f: impl FnOnce(&Call) -> R) -> R {
        f(self.state.lock().unwrap().calls.last().unwrap())
    }

    /// Number of bus registrations ever made.
    pub fn registrations(&self) -> usize {
        self.registrations.load(Ordering::SeqCst)
    }

    /// Number of bus registrations currently alive.
    pub fn live_registrations(&self) -> usize {
        self.live.load(Ordering::SeqCst)
    }

    /// Delivers a signal to every registration whose match spec covers it.
    /// Well-known sender names are resolved like the bus daemon does.
    pub fn emit(&self, msg: Message) {
        let header = msg.header();
        let sender = header.sender().map(|s| s.as_str());
        let mut state = self.state.lock().unwrap();
        let State {
            owners,
            subscriptions,
            ..
        } = &mut *state;
        subscriptions.retain(|(spec, tx)| {
            let from_sender = spec.sender.as_deref().map_or(true, |wanted| {
                let wanted = owners.get(wanted).map_or(wanted, String::as_str);
                sender == Some(wanted)
            });
            !(from_sender && spec.matches(&msg)) || tx.send(msg.clone()).is_ok()
        });
    }

    fn handle(
        &self,
        path: &str,
        interface: &str,
        method: &str,
        args: &Data<'static, 'static>,
    ) -> Result<Data<'static, 'static>> {
        let mut state = self.state.lock().unwrap();
        if interface == PROPERTIES_INTERFACE {
            let unknown = || {
                Error::Dbus(zbus::Error::FDO(Box::new(zbus::fdo::Error::UnknownObject(
                    path.to_owned(),
                ))))
            };
            let invalid = |name: &str| {
                Error::Dbus(zbus::Error::FDO(Box::new(zbus::fdo::Error::InvalidArgs(
                    format!("No such property '{}'", name),
                ))))
            };
            return match method {
                "GetAll" => {
                    let (iface,): (String,) = args.deserialize()?.0;
                    let props = state
                        .objects
                        .get(&(path.to_owned(), iface))
                        .ok_or_else(unknown)?;
                    encode(props)
                }
                "Get" => {
                    let (iface, name): (String, String) = args.deserialize()?.0;
                    let value = state
                        .objects
                        .get(&(path.to_owned(), iface))
                        .ok_or_else(unknown)?
                        .get(&name)
                        .ok_or_else(|| invalid(&name))?;
                    encode(value)
                }
                "Set" => {
                    let (iface, name, value): (String, String, OwnedValue) =
                        args.deserialize()?.0;
                    let props = state
                        .objects
                        .get_mut(&(path.to_owned(), iface))
                        .ok_or_else(unknown)?;
                    if !props.contains_key(&name) {
                        return Err(invalid(&name));
                    }
                    props.insert(name, value);
                    encode(&())
                }
                other => Err(Error::Dbus(zbus::Error::FDO(Box::new(
                    zbus::fdo::Error::UnknownMethod(other.to_owned()),
                )))),
            };
        }
        match state.replies.get(method) {
            Some(reply) => Ok(reply.clone()),
            None => encode(&()),
        }
    }
}

impl Transport for FakeBus {
    async fn call<A, R>(
        &self,
        _destination: &str,
        path: &ObjectPath<'_>,
        interface: &str,
        method: &str,
        args: &A,
    ) -> Result<R>
    where
        A: Serialize + DynamicType + Sync,
        R: DeserializeOwned + Type + Send,
    {
        let args = encode(args)?;
        // give concurrent callers a chance to interleave
        tokio::task::yield_now().await;
        let gate = self.state.lock().unwrap().gates.get(method).cloned();
        if let Some(gate) = gate {
            let _ = gate.entered.send(());
            let _ = gate.release.recv_async().await;
        }
        let reply = self.handle(path.as_str(), interface, method, &args)?;
        self.state.lock().unwrap().calls.push(Call {
            path: path.to_string(),
            interface: interface.to_owned(),
            method: method.to_owned(),
            args,
        });
        Ok(reply.deserialize::<R>()?.0)
    }

    async fn subscribe(&self, spec: &MatchSpec) -> Result<BoxStream<'static, Message>> {
        let mut state = self.state.lock().unwrap();
        if state.fail_subscribe {
            return Err(Error::Dbus(zbus::Error::Failure(
                "AddMatch rejected".to_owned(),
            )));
        }
        let (tx, rx) = flume::unbounded();
        state.subscriptions.push((spec.clone(), tx));
        self.registrations.fetch_add(1, Ordering::SeqCst);
        self.live.fetch_add(1, Ordering::SeqCst);
        Ok(Registration {
            inner: rx.into_stream().boxed(),
            live: self.live.clone(),
        }
        .boxed())
    }
}

/// Counts itself out of the live registrations when dropped.
struct Registration {
    inner: BoxStream<'static, Message>,
    live: Arc<AtomicUsize>,
}

impl futures_util::Stream for Registration {
    type Item = Message;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Message>> {
        self.inner.poll_next_unpin(cx)
    }
}

impl Drop for Registration {
    fn drop(&mut self) {
        self.live.fetch_sub(1, Ordering::SeqCst);
    }
}
