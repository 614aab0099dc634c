use alloc::{
    collections::BTreeMap,
    format,
    string::{String, ToString},
};
use spin::RwLock;

use crate::status::{Data, RegError};

/// ----------------------------------------------
///  Service layout
/// ----------------------------------------------
pub const SERVICES_ROOT: &str = "SYSTEM/CurrentControlSet/Services";

pub fn service_key(service: &str) -> String {
    format!("{}/{}", SERVICES_ROOT, service)
}

pub fn parameters_key(service: &str) -> String {
    format!("{}/{}/Parameters", SERVICES_ROOT, service)
}

pub fn status_key(service: &str) -> String {
    format!("{}/{}/Status", SERVICES_ROOT, service)
}

/// Hierarchical key/value store the driver reads its configuration from.
pub trait ConfigStore: Send + Sync {
    fn get_value(&self, key_path: &str, name: &str) -> Result<Data, RegError>;
    fn set_value(&self, key_path: &str, name: &str, data: Data) -> Result<(), RegError>;
    fn create_key(&self, path: &str) -> Result<(), RegError>;
    fn key_exists(&self, path: &str) -> bool;
}

#[derive(Debug, Clone, Default)]
pub struct Key {
    /// name → Data
    pub values: BTreeMap<String, Data>,
    /// sub-key name → Key
    pub sub_keys: BTreeMap<String, Key>,
}

impl Key {
    pub const fn empty() -> Self {
        Self {
            values: BTreeMap::new(),
            sub_keys: BTreeMap::new(),
        }
    }
}

/// In-memory registry tree.
#[derive(Debug, Default)]
pub struct Registry {
    root: RwLock<BTreeMap<String, Key>>,
}

fn walk<'a>(root: &'a BTreeMap<String, Key>, path: &str) -> Option<&'a Key> {
    let mut node_map = root;
    let mut last: Option<&Key> = None;

    for seg in path.split('/').filter(|s| !s.is_empty()) {
        let k = node_map.get(seg)?;
        last = Some(k);
        node_map = &k.sub_keys;
    }

    last
}

fn walk_mut<'a>(root: &'a mut BTreeMap<String, Key>, path: &str) -> Option<&'a mut Key> {
    let mut segments = path.split('/').filter(|s| !s.is_empty());
    let mut key = root.get_mut(segments.next()?)?;
    for seg in segments {
        key = key.sub_keys.get_mut(seg)?;
    }
    Some(key)
}

impl Registry {
    pub const fn empty() -> Self {
        Self {
            root: RwLock::new(BTreeMap::new()),
        }
    }

    pub fn get_key(&self, path: &str) -> Option<Key> {
        walk(&self.root.read(), path).cloned()
    }

    pub fn delete_value(&self, key_path: &str, name: &str) -> Result<bool, RegError> {
        let mut root = self.root.write();
        let key = walk_mut(&mut root, key_path).ok_or(RegError::KeyNotFound)?;
        Ok(key.values.remove(name).is_some())
    }
}

impl ConfigStore for Registry {
    fn get_value(&self, key_path: &str, name: &str) -> Result<Data, RegError> {
        let root = self.root.read();
        let key = walk(&root, key_path).ok_or(RegError::KeyNotFound)?;
        key.values.get(name).cloned().ok_or(RegError::ValueNotFound)
    }

    fn set_value(&self, key_path: &str, name: &str, data: Data) -> Result<(), RegError> {
        let mut root = self.root.write();
        let key = walk_mut(&mut root, key_path).ok_or(RegError::KeyNotFound)?;
        key.values.insert(name.to_string(), data);
        Ok(())
    }

    fn create_key(&self, path: &str) -> Result<(), RegError> {
        let mut root = self.root.write();
        let mut node_map = &mut *root;
        let mut segments = path.split('/').filter(|s| !s.is_empty()).peekable();

        while let Some(seg) = segments.next() {
            let is_last = segments.peek().is_none();

            if is_last {
                if node_map.contains_key(seg) {
                    return Err(RegError::KeyAlreadyExists);
                }
                node_map.insert(seg.to_string(), Key::empty());
            } else {
                node_map = &mut node_map
                    .entry(seg.to_string())
                    .or_insert_with(Key::empty)
                    .sub_keys;
            }
        }
        Ok(())
    }

    fn key_exists(&self, path: &str) -> bool {
        walk(&self.root.read(), path).is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn create_then_round_trip_values() {
        let reg = Registry::empty();
        let params = parameters_key("XENBUS");
        reg.create_key(&params).unwrap();
        assert!(reg.key_exists(&service_key("XENBUS")));
        assert_eq!(reg.create_key(&params), Err(RegError::KeyAlreadyExists));

        assert_eq!(
            reg.get_value(&params, "ActiveDeviceID"),
            Err(RegError::ValueNotFound)
        );
        reg.set_value(&params, "ActiveDeviceID", Data::Str("PCI\\VEN_5853".into()))
            .unwrap();
        assert_eq!(
            reg.get_value(&params, "ActiveDeviceID").unwrap().as_str(),
            Ok("PCI\\VEN_5853")
        );
        assert_eq!(reg.delete_value(&params, "ActiveDeviceID"), Ok(true));
        assert_eq!(reg.get_key(&params).unwrap().values.len(), 0);
    }

    #[test]
    fn missing_key_is_reported() {
        let reg = Registry::empty();
        assert!(!reg.key_exists(&status_key("XENBUS")));
        assert_eq!(
            reg.set_value(&status_key("XENBUS"), "NeedReboot", Data::U32(1)),
            Err(RegError::KeyNotFound)
        );
        assert_eq!(
            reg.get_value(&status_key("XENBUS"), "NeedReboot"),
            Err(RegError::KeyNotFound)
        );
    }
}
