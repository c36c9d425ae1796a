//! Code-keyed factories for reflectors and change maps
//!
//! Backup records name their strategies by string code; the registry turns a
//! code back into a constructor. Unknown codes are not-found errors.

use crate::changemap::{ChangeMap, HashedChangeMap};
use crate::changemap::hashed::MapStrategy;
use crate::error::ApiError;
use crate::reflector::{DiffReflector, PlainReflector, Reflector};
use crate::tree::{Blake3Hasher, Sha256Hasher};
use std::collections::BTreeMap;
use std::marker::PhantomData;
use std::path::Path;

/// Builds a reflector over two change maps
pub trait ReflectorFactory: Send + Sync {
    fn create(
        &self,
        original: Box<dyn ChangeMap>,
        reflection: Box<dyn ChangeMap>,
    ) -> Box<dyn Reflector>;
}

/// Builds change maps by walking a root or decoding stored bytes
pub trait ChangeMapFactory: Send + Sync {
    fn create(&self, root: &Path) -> Result<Box<dyn ChangeMap>, ApiError>;

    fn load(&self, bytes: &[u8], anchor: Option<&Path>) -> Result<Box<dyn ChangeMap>, ApiError>;
}

struct DiffReflectorFactory;

impl ReflectorFactory for DiffReflectorFactory {
    fn create(
        &self,
        original: Box<dyn ChangeMap>,
        reflection: Box<dyn ChangeMap>,
    ) -> Box<dyn Reflector> {
        Box::new(DiffReflector::new(original, reflection))
    }
}

struct PlainReflectorFactory;

impl ReflectorFactory for PlainReflectorFactory {
    fn create(
        &self,
        original: Box<dyn ChangeMap>,
        reflection: Box<dyn ChangeMap>,
    ) -> Box<dyn Reflector> {
        Box::new(PlainReflector::new(original, reflection))
    }
}

struct HashedChangeMapFactory<H>(PhantomData<fn() -> H>);

impl<H: MapStrategy> ChangeMapFactory for HashedChangeMapFactory<H> {
    fn create(&self, root: &Path) -> Result<Box<dyn ChangeMap>, ApiError> {
        Ok(Box::new(HashedChangeMap::<H>::create(root)?))
    }

    fn load(&self, bytes: &[u8], anchor: Option<&Path>) -> Result<Box<dyn ChangeMap>, ApiError> {
        Ok(Box::new(HashedChangeMap::<H>::load(bytes, anchor)?))
    }
}

/// Strategy registry
pub struct Registry {
    reflectors: BTreeMap<String, Box<dyn ReflectorFactory>>,
    change_maps: BTreeMap<String, Box<dyn ChangeMapFactory>>,
}

impl Registry {
    /// Registry with no strategies
    pub fn empty() -> Self {
        Self {
            reflectors: BTreeMap::new(),
            change_maps: BTreeMap::new(),
        }
    }

    pub fn register_reflector(&mut self, code: impl Into<String>, factory: Box<dyn ReflectorFactory>) {
        self.reflectors.insert(code.into(), factory);
    }

    pub fn register_change_map(&mut self, code: impl Into<String>, factory: Box<dyn ChangeMapFactory>) {
        self.change_maps.insert(code.into(), factory);
    }

    pub fn reflector(&self, code: &str) -> Result<&dyn ReflectorFactory, ApiError> {
        self.reflectors
            .get(code)
            .map(|f| f.as_ref())
            .ok_or_else(|| ApiError::NotFound(format!("no reflector registered for code {:?}", code)))
    }

    pub fn change_map(&self, code: &str) -> Result<&dyn ChangeMapFactory, ApiError> {
        self.change_maps
            .get(code)
            .map(|f| f.as_ref())
            .ok_or_else(|| ApiError::NotFound(format!("no change map registered for code {:?}", code)))
    }

    pub fn reflector_codes(&self) -> Vec<&str> {
        self.reflectors.keys().map(String::as_str).collect()
    }

    pub fn change_map_codes(&self) -> Vec<&str> {
        self.change_maps.keys().map(String::as_str).collect()
    }
}

impl Default for Registry {
    fn default() -> Self {
        let mut registry = Self::empty();
        registry.register_reflector(DiffReflector::CODE, Box::new(DiffReflectorFactory));
        registry.register_reflector(PlainReflector::CODE, Box::new(PlainReflectorFactory));
        registry.register_change_map(
            Blake3Hasher::CODE,
            Box::new(HashedChangeMapFactory::<Blake3Hasher>(PhantomData)),
        );
        registry.register_change_map(
            Sha256Hasher::CODE,
            Box::new(HashedChangeMapFactory::<Sha256Hasher>(PhantomData)),
        );
        registry
    }
}
