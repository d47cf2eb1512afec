use std::collections::HashMap;

use self::osm::{OsmId, OsmNode, OsmRelation, OsmWay};

pub mod document;
pub mod osm;
pub mod pool;
pub mod tags;

/// Map data as read from one input file. Entries are keyed by id and hold
/// references as bare ids; nothing is resolved until assembly.
#[derive(Debug, Default, Clone)]
pub struct OsmMapData {
    pub nodes: HashMap<OsmId, OsmNode>,
    pub ways: HashMap<OsmId, OsmWay>,
    pub relations: HashMap<OsmId, OsmRelation>,
}

impl OsmMapData {
    pub fn upsert_node(&mut self, id: OsmId) -> &mut OsmNode {
        self.nodes.entry(id).or_insert_with(|| OsmNode::new(id))
    }

    pub fn upsert_way(&mut self, id: OsmId) -> &mut OsmWay {
        self.ways.entry(id).or_insert_with(|| OsmWay::new(id))
    }

    pub fn upsert_relation(&mut self, id: OsmId) -> &mut OsmRelation {
        self.relations
            .entry(id)
            .or_insert_with(|| OsmRelation::new(id))
    }

    pub fn entity_count(&self) -> usize {
        self.nodes.len() + self.ways.len() + self.relations.len()
    }
}
