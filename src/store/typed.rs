//! Statically typed facade over a [`Store`].

use std::any::type_name;
use std::marker::PhantomData;

use serde::Serialize;
use serde::de::DeserializeOwned;

use super::Store;
use crate::context::Context;
use crate::error::{Error, Result};
use crate::value::Value;

/// A view over a [`Store`] for a single value type `T`.
///
/// Reads decode the stored value into `T`; a value present under the key
/// that does not decode as `T` surfaces as [`Error::TypeAssertion`], not as
/// absence. Opaque values never decode.
#[derive(Debug, Clone)]
pub struct TypedStore<T> {
    store: Store,
    _marker: PhantomData<fn() -> T>,
}

impl<T: Serialize + DeserializeOwned> TypedStore<T> {
    pub fn new(store: Store) -> Self {
        TypedStore {
            store,
            _marker: PhantomData,
        }
    }

    pub fn get(&self, key: &str) -> Result<Option<T>> {
        match self.store.get(key) {
            None => Ok(None),
            Some(value) => {
                let json = serde_json::Value::try_from(value).map_err(|_| Error::TypeAssertion {
                    key: key.to_string(),
                    expected: type_name::<T>(),
                })?;
                serde_json::from_value(json)
                    .map(Some)
                    .map_err(|_| Error::TypeAssertion {
                        key: key.to_string(),
                        expected: type_name::<T>(),
                    })
            }
        }
    }

    pub fn set(&self, ctx: &Context, key: impl Into<String>, value: T) -> Result<()> {
        let json = serde_json::to_value(value)?;
        self.store.set(ctx, key, Value::from(json))
    }

    pub fn delete(&self, ctx: &Context, key: &str) -> Result<()> {
        self.store.delete(ctx, key)
    }

    pub fn scope(&self, prefix: &str) -> TypedStore<T> {
        TypedStore::new(self.store.scope(prefix))
    }
}
