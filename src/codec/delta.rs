/// Logical fields that keep their own running total.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeltaField {
    NodeId,
    WayId,
    RelationId,
    Longitude,
    Latitude,
    NodeRef,
    MemberNode,
    MemberWay,
    MemberRelation,
    Timestamp,
    Changeset,
}

const FIELD_COUNT: usize = 11;

impl DeltaField {
    fn index(self) -> usize {
        self as usize
    }
}

/// Running accumulators for delta-coded sequences.
///
/// Owned by whichever decode pass drives it and passed by `&mut`; callers reset
/// it at block (PBF) or reset-marker (O5M) boundaries only.
#[derive(Debug, Clone, Default)]
pub struct DeltaDecoder {
    accumulators: [i64; FIELD_COUNT],
}

impl DeltaDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn decode(&mut self, field: DeltaField, delta: i64) -> i64 {
        let slot = &mut self.accumulators[field.index()];
        *slot = slot.wrapping_add(delta);
        *slot
    }

    pub fn current(&self, field: DeltaField) -> i64 {
        self.accumulators[field.index()]
    }

    pub fn reset(&mut self) {
        self.accumulators = [0; FIELD_COUNT];
    }
}

/// Inverse of [`DeltaDecoder`].
#[derive(Debug, Clone, Default)]
pub struct DeltaEncoder {
    previous: [i64; FIELD_COUNT],
}

impl DeltaEncoder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn encode(&mut self, field: DeltaField, value: i64) -> i64 {
        let slot = &mut self.previous[field.index()];
        let delta = value.wrapping_sub(*slot);
        *slot = value;
        delta
    }

    pub fn reset(&mut self) {
        self.previous = [0; FIELD_COUNT];
    }
}
