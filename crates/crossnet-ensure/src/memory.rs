//! In-memory object store for exercising the ensure protocol
//!
//! Behaves like the API server for the four store verbs: names are unique,
//! creates assign a resource version and refuse objects that already carry
//! one, deletes of absent names fail with `NotFound`. A competing writer can be simulated with
//! [`MemoryStore::with_adversary`], which puts its own object back after
//! every delete, and individual calls can be made to fail on demand.

use std::collections::{BTreeMap, VecDeque};

use async_trait::async_trait;
use kube::{Resource, ResourceExt};
use parking_lot::Mutex;

use crate::store::{ObjectStore, StoreError};

struct State<K> {
    objects: BTreeMap<String, K>,
    next_version: u64,
    adversary: Option<K>,
    create_failures: VecDeque<StoreError>,
    delete_failures: VecDeque<StoreError>,
    creates: u32,
    deletes: u32,
}

/// Thread-safe in-memory [`ObjectStore`]
pub struct MemoryStore<K> {
    state: Mutex<State<K>>,
}

impl<K> Default for MemoryStore<K> {
    fn default() -> Self {
        Self {
            state: Mutex::new(State {
                objects: BTreeMap::new(),
                next_version: 1,
                adversary: None,
                create_failures: VecDeque::new(),
                delete_failures: VecDeque::new(),
                creates: 0,
                deletes: 0,
            }),
        }
    }
}

impl<K> MemoryStore<K>
where
    K: Resource + Clone,
{
    /// Empty store
    pub fn new() -> Self {
        Self::default()
    }

    /// Store pre-populated with an object
    pub fn with_object(self, object: K) -> Self {
        self.insert(object);
        self
    }

    /// After every successful delete, immediately recreate `object`
    pub fn with_adversary(self, object: K) -> Self {
        self.state.lock().adversary = Some(object);
        self
    }

    /// Insert or overwrite an object without going through `create`
    pub fn insert(&self, object: K) {
        let mut state = self.state.lock();
        Self::put(&mut state, object);
    }

    /// Make the next create fail with `err`
    pub fn fail_next_create(&self, err: StoreError) {
        self.state.lock().create_failures.push_back(err);
    }

    /// Make the next delete fail with `err`
    pub fn fail_next_delete(&self, err: StoreError) {
        self.state.lock().delete_failures.push_back(err);
    }

    /// Current object with the given name
    pub fn object(&self, name: &str) -> Option<K> {
        self.state.lock().objects.get(name).cloned()
    }

    /// Number of objects held
    pub fn len(&self) -> usize {
        self.state.lock().objects.len()
    }

    /// True when no objects are held
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Number of create calls seen, successful or not
    pub fn create_calls(&self) -> u32 {
        self.state.lock().creates
    }

    /// Number of delete calls seen, successful or not
    pub fn delete_calls(&self) -> u32 {
        self.state.lock().deletes
    }

    fn put(state: &mut State<K>, mut object: K) -> K {
        object.meta_mut().resource_version = Some(state.next_version.to_string());
        state.next_version += 1;
        state.objects.insert(object.name_any(), object.clone());
        object
    }
}

#[async_trait]
impl<K> ObjectStore<K> for MemoryStore<K>
where
    K: Resource + Clone + Send + Sync + 'static,
{
    async fn create(&self, object: &K) -> Result<K, StoreError> {
        let mut state = self.state.lock();
        state.creates += 1;
        if let Some(err) = state.create_failures.pop_front() {
            return Err(err);
        }

        let name = object.name_any();
        if object.meta().resource_version.is_some() {
            return Err(StoreError::Other {
                name,
                message: "resourceVersion should not be set on objects to be created".to_string(),
            });
        }
        if state.objects.contains_key(&name) {
            return Err(StoreError::AlreadyExists { name });
        }
        Ok(Self::put(&mut state, object.clone()))
    }

    async fn delete(&self, name: &str) -> Result<(), StoreError> {
        let mut state = self.state.lock();
        state.deletes += 1;
        if let Some(err) = state.delete_failures.pop_front() {
            return Err(err);
        }

        if state.objects.remove(name).is_none() {
            return Err(StoreError::NotFound {
                name: name.to_string(),
            });
        }
        if let Some(adversary) = state.adversary.clone() {
            Self::put(&mut state, adversary);
        }
        Ok(())
    }

    async fn get(&self, name: &str) -> Result<K, StoreError> {
        self.state
            .lock()
            .objects
            .get(name)
            .cloned()
            .ok_or_else(|| StoreError::NotFound {
                name: name.to_string(),
            })
    }

    async fn list(&self) -> Result<Vec<K>, StoreError> {
        Ok(self.state.lock().objects.values().cloned().collect())
    }
}
