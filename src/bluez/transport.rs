use super::BusKind;
use crate::Result;
use futures_util::stream::{BoxStream, StreamExt};
use serde::{de::DeserializeOwned, Serialize};
use std::future::Future;
use zbus::{Message, MessageStream};
use zvariant::{DynamicType, ObjectPath, OwnedObjectPath, Type};

/// Which signals a subscription asks the bus for.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct MatchSpec {
    pub interface: String,
    pub member: Option<String>,
    pub path: Option<OwnedObjectPath>,
    /// Bus name of the emitter. Well-known names are resolved by the bus.
    pub sender: Option<String>,
}

impl MatchSpec {
    pub fn new(interface: &str) -> Self {
        Self {
            interface: interface.to_owned(),
            member: None,
            path: None,
            sender: None,
        }
    }

    pub fn member(mut self, member: &str) -> Self {
        self.member = Some(member.to_owned());
        self
    }

    pub fn path(mut self, path: impl Into<OwnedObjectPath>) -> Self {
        self.path = Some(path.into());
        self
    }

    pub fn sender(mut self, sender: &str) -> Self {
        self.sender = Some(sender.to_owned());
        self
    }

    /// Whether a received signal falls under this match. `sender` needs name
    /// resolution and is left to the caller.
    pub fn matches(&self, msg: &Message) -> bool {
        let header = msg.header();
        header.interface().map(|i| i.as_str()) == Some(self.interface.as_str())
            && self
                .member
                .as_deref()
                .map_or(true, |m| header.member().map(|h| h.as_str()) == Some(m))
            && self
                .path
                .as_ref()
                .map_or(true, |p| header.path().map(|h| h.as_str()) == Some(p.as_str()))
    }
}

/// The two bus primitives every binding is built from.
///
/// Properties are accessed through `org.freedesktop.DBus.Properties` method
/// calls, so `call` covers them as well.
pub trait Transport: Clone + Send + Sync + 'static {
    fn call<A, R>(
        &self,
        destination: &str,
        path: &ObjectPath<'_>,
        interface: &str,
        method: &str,
        args: &A,
    ) -> impl Future<Output = Result<R>> + Send
    where
        A: Serialize + DynamicType + Sync,
        R: DeserializeOwned + Type + Send;

    /// Registers a signal match with the bus. The registration lives as long
    /// as the returned stream.
    fn subscribe(
        &self,
        spec: &MatchSpec,
    ) -> impl Future<Output = Result<BoxStream<'static, Message>>> + Send;
}

#[derive(Clone, Debug)]
pub struct DbusTransport {
    conn: zbus::Connection,
}

impl DbusTransport {
    pub async fn connect(bus: BusKind) -> Result<Self> {
        let conn = match bus {
            BusKind::System => zbus::Connection::system().await?,
            BusKind::Session => zbus::Connection::session().await?,
        };
        Ok(Self { conn })
    }

    pub fn connection(&self) -> &zbus::Connection {
        &self.conn
    }
}

impl From<zbus::Connection> for DbusTransport {
    fn from(conn: zbus::Connection) -> Self {
        Self { conn }
    }
}

impl Transport for DbusTransport {
    async fn call<A, R>(
        &self,
        destination: &str,
        path: &ObjectPath<'_>,
        interface: &str,
        method: &str,
        args: &A,
    ) -> Result<R>
    where
        A: Serialize + DynamicType + Sync,
        R: DeserializeOwned + Type + Send,
    {
        let reply = self
            .conn
            .call_method(
                Some(destination),
                path.as_str(),
                Some(interface),
                method,
                args,
            )
            .await?;
        let body = reply.body();
        Ok(body.deserialize::<R>()?)
    }

    async fn subscribe(&self, spec: &MatchSpec) -> Result<BoxStream<'static, Message>> {
        let mut rule = zbus::MatchRule::builder()
            .msg_type(zbus::message::Type::Signal)
            .interface(spec.interface.as_str())?;
        if let Some(ref member) = spec.member {
            rule = rule.member(member.as_str())?;
        }
        if let Some(ref path) = spec.path {
            rule = rule.path(path.as_str())?;
        }
        if let Some(ref sender) = spec.sender {
            rule = rule.sender(sender.as_str())?;
        }
        let rule = rule.build();
        tracing::debug!("Adding match rule {}", rule);

        let stream = MessageStream::for_match_rule(rule, &self.conn, None).await?;
        Ok(stream
            .filter_map(|msg| async move {
                match msg {
                    Ok(msg) => Some(msg),
                    Err(e) => {
                        tracing::warn!("Dropping undecodable signal: {}", e);
                        None
                    }
                }
            })
            .boxed())
    }
}
