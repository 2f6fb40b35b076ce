// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

use serde::de::{Deserialize, Deserializer, Error as _, MapAccess, Visitor};
use serde::ser::{Serialize, SerializeMap, Serializer};
use std::fmt;
use std::hash::{BuildHasher, Hash};
use std::marker::PhantomData;

use crate::hash::map::TrieMap;

struct MapVisitor<'de, K, V, S> {
    phantom_k: PhantomData<K>,
    phantom_v: PhantomData<V>,
    phantom_s: PhantomData<S>,
    phantom_lifetime: PhantomData<&'de ()>,
}

impl<'de, K, V, S> MapVisitor<'de, K, V, S> {
    pub(crate) fn new() -> MapVisitor<'de, K, V, S> {
        MapVisitor {
            phantom_k: PhantomData,
            phantom_v: PhantomData,
            phantom_s: PhantomData,
            phantom_lifetime: PhantomData,
        }
    }
}

impl<'de, K, V, S> Visitor<'de> for MapVisitor<'de, K, V, S>
where
    K: Deserialize<'de> + Hash + Eq,
    V: Deserialize<'de>,
    S: BuildHasher + Default,
{
    type Value = TrieMap<K, V, S>;

    fn expecting(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter.write_str("a map")
    }

    fn visit_map<Access>(self, mut access: Access) -> Result<Self::Value, Access::Error>
    where
        Access: MapAccess<'de>,
    {
        let map = TrieMap::default();
        while let Some((k, v)) = access.next_entry()? {
            map.assign(k, v).map_err(Access::Error::custom)?;
        }
        Ok(map)
    }
}

impl<'de, K, V, S> Deserialize<'de> for TrieMap<K, V, S>
where
    K: Deserialize<'de> + Hash + Eq,
    V: Deserialize<'de>,
    S: BuildHasher + Default,
{
    fn deserialize<D>(des: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        des.deserialize_map(MapVisitor::<'de, K, V, S>::new())
    }
}

impl<K, V, S> Serialize for TrieMap<K, V, S>
where
    K: Serialize,
    V: Serialize,
{
    fn serialize<Ser>(&self, ser: Ser) -> Result<Ser::Ok, Ser::Error>
    where
        Ser: Serializer,
    {
        // Taken first so the length written matches the entries written,
        // whatever other threads do meanwhile.
        let snapshot: Vec<_> = self.iter().collect();
        let mut s = ser.serialize_map(Some(snapshot.len()))?;
        for entry in &snapshot {
            s.serialize_entry(entry.key(), entry.value())?;
        }
        s.end()
    }
}

// Tests
