use crate::{Error, Result};
use std::{collections::HashMap, sync::Arc};
use tokio::sync::RwLock;
use zvariant::{OwnedValue, Value};

/// Shared, lock-guarded copy of an interface's properties.
pub type PropertyCache<P> = Arc<RwLock<P>>;

/// Schema of one D-Bus interface: its name and its typed property list.
pub trait Properties: Default + Clone + std::fmt::Debug + Send + Sync + 'static {
    const INTERFACE: &'static str;

    /// Stores one property. Returns `Ok(false)` for names this interface
    /// doesn't know, so newer daemons don't break older bindings.
    fn update(&mut self, name: &str, value: &Value<'_>) -> Result<bool>;

    fn to_map(&self) -> Result<HashMap<String, OwnedValue>>;

    fn merge(&mut self, props: &HashMap<String, OwnedValue>) -> Result<()> {
        for (name, value) in props {
            if !self.update(name, value)? {
                tracing::trace!("{}: ignoring unknown property {}", Self::INTERFACE, name);
            }
        }
        Ok(())
    }

    fn from_dbus_map(props: &HashMap<String, OwnedValue>) -> Result<Self> {
        let mut ret = Self::default();
        ret.merge(props)?;
        Ok(ret)
    }
}

/// Conversion between a property's Rust type and its D-Bus value.
pub trait PropertyValue: Sized {
    const SIGNATURE: &'static str;

    fn from_value(name: &str, value: &Value<'_>) -> Result<Self>;

    fn to_owned_value(&self) -> Result<OwnedValue>;
}

fn mismatch(name: &str, expected: &'static str, value: &Value<'_>) -> Error {
    Error::PropertyType {
        name: name.to_owned(),
        expected,
        found: value.value_signature().to_string(),
    }
}

macro_rules! property_value {
    ($ty:ty, $variant:ident, $sig:literal) => {
        impl PropertyValue for $ty {
            const SIGNATURE: &'static str = $sig;

            fn from_value(name: &str, value: &Value<'_>) -> Result<Self> {
                match value {
                    Value::$variant(v) => Ok(*v),
                    Value::Value(inner) => Self::from_value(name, inner),
                    other => Err(mismatch(name, Self::SIGNATURE, other)),
                }
            }

            fn to_owned_value(&self) -> Result<OwnedValue> {
                Ok(OwnedValue::try_from(Value::from(*self))?)
            }
        }
    };
}

property_value!(bool, Bool, "b");
property_value!(u16, U16, "q");
property_value!(u32, U32, "u");

impl PropertyValue for String {
    const SIGNATURE: &'static str = "s";

    fn from_value(name: &str, value: &Value<'_>) -> Result<Self> {
        match value {
            Value::Str(s) => Ok(s.as_str().to_owned()),
            Value::Value(inner) => Self::from_value(name, inner),
            other => Err(mismatch(name, Self::SIGNATURE, other)),
        }
    }

    fn to_owned_value(&self) -> Result<OwnedValue> {
        Ok(OwnedValue::try_from(Value::from(self.as_str()))?)
    }
}
