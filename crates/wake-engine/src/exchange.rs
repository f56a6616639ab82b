//! Ownership exchange between ranks.
//!
//! After every local phase each rank, in rank order, broadcasts the
//! metadata of the markers it stores. Every rank then derives each
//! marker's new owner from its element, and the old owner hands any
//! in-flight Runge-Kutta state and payload to the new one as a sequence
//! of [`Envelope`]s. Markers that left the domain are handed to the sink
//! rank and drop their payload. The phase ends with every rank sending
//! [`EnvelopeKind::EndOfExchange`] to every peer, so a missing or extra
//! message shows up as a [`ProtocolError`] rather than a hang.
//!
//! # Wire format
//!
//! All integers little-endian; points are a `u8` count plus f64s,
//! values a `u32` count plus f64s.
//!
//! ```text
//! envelope := kind:u8 marker:u32 stage:u8 payload
//!   Step          payload = step:u32 (u32::MAX = done)
//!   Stage         payload = point
//!   OldPosition   payload = point
//!   Exited        payload = point
//!   EndOfExchange payload = (empty)
//!   Quantities    payload = values
//!
//! batch    := count:u32 header*
//! header   := id:u32 kind:u8 position:point local:point
//!             element:u32 previous:u32 owner:u32 step:u32
//! ```

use wake_comm::{codec, CommError, Communicator};
use wake_core::{ElementId, MarkerId, MarkerKind, Point, Rank, Step};
use wake_mesh::Mesh;

use crate::arena::{StageArena, StageState};
use crate::error::{AdvectError, ProtocolError};
use crate::line::Line;
use crate::marker::Marker;
use crate::metrics::AdvectMetrics;
use crate::payload::PayloadStore;

const NO_ELEMENT: u32 = u32::MAX;

// ── Envelopes ──────────────────────────────────────────────────────

/// What an [`Envelope`] carries.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum EnvelopeKind {
    /// The marker's step counter. Always the first envelope of a migration.
    Step,
    /// One stage increment, `stage_index` names which.
    Stage,
    /// Position at the start of the interrupted macro-step.
    OldPosition,
    /// Final position of a marker that left the domain.
    Exited,
    /// No more envelopes from this sender in this round.
    EndOfExchange,
    /// The marker's payload. Last envelope of a migration.
    Quantities,
}

impl EnvelopeKind {
    fn tag(self) -> u8 {
        match self {
            Self::Step => 0,
            Self::Stage => 1,
            Self::OldPosition => 2,
            Self::Exited => 3,
            Self::EndOfExchange => 4,
            Self::Quantities => 5,
        }
    }

    fn from_tag(tag: u8) -> Option<Self> {
        match tag {
            0 => Some(Self::Step),
            1 => Some(Self::Stage),
            2 => Some(Self::OldPosition),
            3 => Some(Self::Exited),
            4 => Some(Self::EndOfExchange),
            5 => Some(Self::Quantities),
            _ => None,
        }
    }
}

/// Payload of an [`Envelope`], determined by its kind.
#[derive(Clone, Debug, PartialEq)]
pub enum Payload {
    /// No payload (`EndOfExchange`).
    Empty,
    /// A step counter (`Step`).
    Step(Step),
    /// A vector (`Stage`, `OldPosition`, `Exited`).
    Point(Point),
    /// Arbitrary-length values (`Quantities`).
    Values(Vec<f64>),
}

/// One point-to-point message of the exchange phase.
#[derive(Clone, Debug, PartialEq)]
pub struct Envelope {
    /// The marker the message is about.
    pub marker: MarkerId,
    /// Stage index for `Stage` envelopes, zero otherwise.
    pub stage_index: u8,
    /// Message kind.
    pub kind: EnvelopeKind,
    /// Message body.
    pub payload: Payload,
}

impl Envelope {
    /// Step counter of a migrating marker.
    pub fn step(marker: MarkerId, step: Step) -> Self {
        Self {
            marker,
            stage_index: 0,
            kind: EnvelopeKind::Step,
            payload: Payload::Step(step),
        }
    }

    /// Stage increment `stage_index` of a migrating marker.
    pub fn stage(marker: MarkerId, stage_index: u8, k: &[f64]) -> Self {
        Self {
            marker,
            stage_index,
            kind: EnvelopeKind::Stage,
            payload: Payload::Point(Point::from_slice(k)),
        }
    }

    /// Macro-step start position of a migrating marker.
    pub fn old_position(marker: MarkerId, x0: &[f64]) -> Self {
        Self {
            marker,
            stage_index: 0,
            kind: EnvelopeKind::OldPosition,
            payload: Payload::Point(Point::from_slice(x0)),
        }
    }

    /// Final position of a marker handed to the sink.
    pub fn exited(marker: MarkerId, x: &[f64]) -> Self {
        Self {
            marker,
            stage_index: 0,
            kind: EnvelopeKind::Exited,
            payload: Payload::Point(Point::from_slice(x)),
        }
    }

    /// Payload of a migrating marker.
    pub fn quantities(marker: MarkerId, values: &[f64]) -> Self {
        Self {
            marker,
            stage_index: 0,
            kind: EnvelopeKind::Quantities,
            payload: Payload::Values(values.to_vec()),
        }
    }

    /// End-of-round sentinel.
    pub fn end_of_exchange() -> Self {
        Self {
            marker: MarkerId(0),
            stage_index: 0,
            kind: EnvelopeKind::EndOfExchange,
            payload: Payload::Empty,
        }
    }

    /// The point payload, if any.
    pub fn point(&self) -> Option<&Point> {
        match &self.payload {
            Payload::Point(p) => Some(p),
            _ => None,
        }
    }

    /// The values payload, if any.
    pub fn values(&self) -> Option<&[f64]> {
        match &self.payload {
            Payload::Values(v) => Some(v),
            _ => None,
        }
    }

    /// The step payload, if any.
    pub fn step_value(&self) -> Option<Step> {
        match self.payload {
            Payload::Step(s) => Some(s),
            _ => None,
        }
    }

    /// Serialize to a frame.
    pub fn encode(&self) -> Vec<u8> {
        let mut w = Vec::with_capacity(32);
        codec::write_u8(&mut w, self.kind.tag());
        codec::write_u32_le(&mut w, self.marker.0);
        codec::write_u8(&mut w, self.stage_index);
        match &self.payload {
            Payload::Empty => {}
            Payload::Step(s) => codec::write_u32_le(&mut w, s.to_raw()),
            Payload::Point(p) => codec::write_point(&mut w, p),
            Payload::Values(v) => codec::write_values(&mut w, v),
        }
        w
    }

    /// Parse a frame produced by [`encode`](Self::encode).
    pub fn decode(frame: &[u8]) -> Result<Self, CommError> {
        let mut r = frame;
        let tag = codec::read_u8(&mut r)?;
        let kind = EnvelopeKind::from_tag(tag).ok_or_else(|| CommError::Malformed {
            detail: format!("unknown envelope kind {tag}"),
        })?;
        let marker = MarkerId(codec::read_u32_le(&mut r)?);
        let stage_index = codec::read_u8(&mut r)?;
        let payload = match kind {
            EnvelopeKind::EndOfExchange => Payload::Empty,
            EnvelopeKind::Step => Payload::Step(Step::from_raw(codec::read_u32_le(&mut r)?)),
            EnvelopeKind::Stage | EnvelopeKind::OldPosition | EnvelopeKind::Exited => {
                Payload::Point(codec::read_point(&mut r)?)
            }
            EnvelopeKind::Quantities => Payload::Values(codec::read_values(&mut r)?),
        };
        codec::expect_end(r)?;
        Ok(Self {
            marker,
            stage_index,
            kind,
            payload,
        })
    }
}

// ── Header batches ─────────────────────────────────────────────────

fn write_element(w: &mut Vec<u8>, e: Option<ElementId>) {
    codec::write_u32_le(w, e.map_or(NO_ELEMENT, |e| e.0));
}

fn read_element(r: &mut &[u8]) -> Result<Option<ElementId>, CommError> {
    let raw = codec::read_u32_le(r)?;
    Ok((raw != NO_ELEMENT).then_some(ElementId(raw)))
}

/// Serialize the replicated metadata of `markers`.
pub fn encode_headers(markers: &[Marker]) -> Vec<u8> {
    let mut w = Vec::with_capacity(4 + markers.len() * 80);
    codec::write_u32_le(&mut w, markers.len() as u32);
    for m in markers {
        codec::write_u32_le(&mut w, m.id.0);
        codec::write_u8(&mut w, m.kind.tag());
        codec::write_point(&mut w, &m.position);
        codec::write_point(&mut w, &m.local);
        write_element(&mut w, m.element);
        write_element(&mut w, m.previous_element);
        codec::write_u32_le(&mut w, m.owner.0);
        codec::write_u32_le(&mut w, m.step.to_raw());
    }
    w
}

/// Parse a batch produced by [`encode_headers`].
pub fn decode_headers(frame: &[u8]) -> Result<Vec<Marker>, CommError> {
    let mut r = frame;
    let count = codec::read_u32_le(&mut r)? as usize;
    // Each header is at least 23 bytes; reject counts the frame cannot hold.
    if count > r.len() / 23 {
        return Err(CommError::Malformed {
            detail: format!("{count} headers in a {} byte frame", frame.len()),
        });
    }
    let mut out = Vec::with_capacity(count);
    for _ in 0..count {
        let id = MarkerId(codec::read_u32_le(&mut r)?);
        let tag = codec::read_u8(&mut r)?;
        let kind = MarkerKind::from_tag(tag).ok_or_else(|| CommError::Malformed {
            detail: format!("unknown marker kind {tag}"),
        })?;
        out.push(Marker {
            id,
            kind,
            position: codec::read_point(&mut r)?,
            local: codec::read_point(&mut r)?,
            element: read_element(&mut r)?,
            previous_element: read_element(&mut r)?,
            owner: Rank(codec::read_u32_le(&mut r)?),
            step: Step::from_raw(codec::read_u32_le(&mut r)?),
        });
    }
    codec::expect_end(r)?;
    Ok(out)
}

// ── Exchange phase ─────────────────────────────────────────────────

/// Everything one rank needs to take part in an exchange round.
pub(crate) struct Exchange<'a> {
    pub comm: &'a dyn Communicator,
    pub mesh: &'a dyn Mesh,
    pub line: &'a mut Line,
    pub arena: &'a mut StageArena,
    pub payloads: &'a mut PayloadStore,
    pub metrics: &'a mut AdvectMetrics,
}

impl Exchange<'_> {
    /// Run one exchange round. Must be called by every rank.
    ///
    /// On return every rank's line carries the same metadata, owners are
    /// updated, and live state sits on the new owners. The line still
    /// needs [`Line::update_line`] to become contiguous again.
    pub fn run(&mut self) -> Result<(), AdvectError> {
        let me = self.comm.rank();
        for root in 0..self.line.ranks() {
            let root = Rank(root as u32);
            self.sync_headers(root)?;
            for slot in self.line.range(root) {
                self.hand_off(root, slot)?;
            }
        }

        for q in 0..self.comm.size() {
            let peer = Rank(q as u32);
            if peer != me {
                self.comm.send(peer, Envelope::end_of_exchange().encode())?;
            }
        }
        for q in 0..self.comm.size() {
            let peer = Rank(q as u32);
            if peer == me {
                continue;
            }
            let env = Envelope::decode(&self.comm.recv(peer)?)?;
            if env.kind != EnvelopeKind::EndOfExchange {
                let step = self.line.get(env.marker).map_or(Step::Done, |m| m.step);
                return Err(ProtocolError::UnexpectedEnvelope {
                    expected: EnvelopeKind::EndOfExchange,
                    found: env.kind,
                    marker: Some(env.marker),
                    step,
                    from: peer,
                    to: me,
                }
                .into());
            }
        }
        Ok(())
    }

    /// Broadcast `root`'s view of its own markers and adopt it.
    fn sync_headers(&mut self, root: Rank) -> Result<(), AdvectError> {
        let me = self.comm.rank();
        let range = self.line.range(root);
        let frame = (root == me).then(|| encode_headers(&self.line.markers()[range.clone()]));
        let frame = self.comm.broadcast(root, frame)?;
        if root == me {
            return Ok(());
        }
        let headers = decode_headers(&frame)?;
        if headers.len() != range.len() {
            return Err(ProtocolError::BatchLength {
                root,
                expected: range.len(),
                found: headers.len(),
            }
            .into());
        }
        for (slot, header) in range.zip(headers) {
            let local = self.line.marker_mut(slot);
            if local.id != header.id {
                return Err(ProtocolError::HeaderMismatch {
                    root,
                    expected: local.id,
                    found: header.id,
                }
                .into());
            }
            *local = header;
        }
        Ok(())
    }

    /// Settle the owner of the marker at `slot` (stored on `root`) and
    /// move its live state if the owner changed.
    fn hand_off(&mut self, root: Rank, slot: usize) -> Result<(), AdvectError> {
        let me = self.comm.rank();
        let new_owner = self.line.marker(slot).owning_process(self.mesh);
        self.line.marker_mut(slot).owner = new_owner;
        let marker = self.line.marker(slot);

        if marker.is_outside() {
            if me == root {
                self.payloads.release(marker.id);
            }
            if root == Rank::SINK {
                return Ok(());
            }
            if me == root {
                self.arena.release(marker.id);
                self.comm
                    .send(Rank::SINK, Envelope::exited(marker.id, &marker.position).encode())?;
                self.metrics.exit_handoffs += 1;
                log::trace!("marker {} handed to sink by rank {root}", marker.id);
            } else if me == Rank::SINK {
                let (id, step) = (marker.id, marker.step);
                let env = self.expect(root, EnvelopeKind::Exited, id, step)?;
                if let Some(x) = env.point() {
                    self.line.marker_mut(slot).position = x.clone();
                }
            }
            return Ok(());
        }

        if new_owner == root {
            return Ok(());
        }
        if me == root {
            self.send_state(slot, new_owner)?;
        } else if me == new_owner {
            self.recv_state(slot, root)?;
        }
        Ok(())
    }

    fn send_state(&mut self, slot: usize, dest: Rank) -> Result<(), AdvectError> {
        let me = self.comm.rank();
        let marker = self.line.marker(slot);
        let (id, step) = (marker.id, marker.step);
        let order = self.arena.order();

        // Nothing goes on the wire unless the whole migration can be sent.
        let state = match self.arena.release(id) {
            Some(state) if mid_macro_step(step, order) => Some(state),
            None if mid_macro_step(step, order) => {
                return Err(ProtocolError::MissingState {
                    marker: id,
                    step,
                    rank: me,
                }
                .into());
            }
            _ => None,
        };
        let values = if self.payloads.width() > 0 {
            let values = self
                .payloads
                .release(id)
                .ok_or(ProtocolError::MissingPayload { marker: id, rank: me })?;
            Some(values)
        } else {
            None
        };

        self.comm.send(dest, Envelope::step(id, step).encode())?;
        if let Some(state) = state {
            for (i, k) in state.stages.iter().enumerate() {
                self.comm
                    .send(dest, Envelope::stage(id, i as u8, k).encode())?;
            }
            self.comm
                .send(dest, Envelope::old_position(id, &state.old_position).encode())?;
        }
        if let Some(values) = values {
            self.comm
                .send(dest, Envelope::quantities(id, &values).encode())?;
        }
        self.metrics.migrations_sent += 1;
        log::trace!("marker {id} at step {step} migrates {me} -> {dest}");
        Ok(())
    }

    fn recv_state(&mut self, slot: usize, source: Rank) -> Result<(), AdvectError> {
        let marker = self.line.marker(slot);
        let (id, expected_step) = (marker.id, marker.step);
        let order = self.arena.order();
        let dim = marker.position.len();

        let env = self.expect(source, EnvelopeKind::Step, id, expected_step)?;
        let step = env.step_value().unwrap_or(expected_step);
        self.line.marker_mut(slot).step = step;

        if mid_macro_step(step, order) {
            let mut state = StageState::zeroed(order, dim);
            for i in 0..order {
                let env = self.expect(source, EnvelopeKind::Stage, id, step)?;
                if usize::from(env.stage_index) != i {
                    return Err(ProtocolError::WrongStage {
                        marker: id,
                        expected: i as u8,
                        found: env.stage_index,
                        from: source,
                        to: self.comm.rank(),
                    }
                    .into());
                }
                if let Some(k) = env.point() {
                    state.stages[i] = k.clone();
                }
            }
            let env = self.expect(source, EnvelopeKind::OldPosition, id, step)?;
            if let Some(x0) = env.point() {
                state.old_position = x0.clone();
            }
            self.arena.insert(id, state);
        }

        let width = self.payloads.width();
        if width > 0 {
            let env = self.expect(source, EnvelopeKind::Quantities, id, step)?;
            let values = env.values().unwrap_or_default().to_vec();
            if values.len() != width {
                return Err(ProtocolError::PayloadLength {
                    marker: id,
                    expected: width,
                    found: values.len(),
                    from: source,
                    to: self.comm.rank(),
                }
                .into());
            }
            self.payloads.insert(id, values);
        }
        self.metrics.migrations_received += 1;
        Ok(())
    }

    /// Receive the next envelope from `source` and check kind and marker.
    fn expect(
        &self,
        source: Rank,
        kind: EnvelopeKind,
        marker: MarkerId,
        step: Step,
    ) -> Result<Envelope, AdvectError> {
        let me = self.comm.rank();
        let env = Envelope::decode(&self.comm.recv(source)?)?;
        if env.kind != kind {
            return Err(ProtocolError::UnexpectedEnvelope {
                expected: kind,
                found: env.kind,
                marker: Some(marker),
                step,
                from: source,
                to: me,
            }
            .into());
        }
        if env.marker != marker {
            return Err(ProtocolError::WrongMarker {
                expected: marker,
                found: env.marker,
                step,
                from: source,
                to: me,
            }
            .into());
        }
        Ok(env)
    }
}

/// Whether a marker at `step` has stage state worth sending.
fn mid_macro_step(step: Step, order: usize) -> bool {
    match step {
        Step::At(k) => k as usize % order != 0,
        Step::Done => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use smallvec::smallvec;
    use wake_comm::{Cluster, ClusterConfig, LocalComm};
    use wake_mesh::BoxMesh;

    fn decode(env: &Envelope) -> Envelope {
        Envelope::decode(&env.encode()).unwrap()
    }

    #[test]
    fn envelopes_survive_the_wire() {
        let cases = [
            Envelope::step(MarkerId(3), Step::At(7)),
            Envelope::step(MarkerId(3), Step::Done),
            Envelope::stage(MarkerId(4), 2, &[0.25, -0.5]),
            Envelope::old_position(MarkerId(5), &[1.0, 2.0, 3.0]),
            Envelope::exited(MarkerId(6), &[2.9, 0.5]),
            Envelope::quantities(MarkerId(7), &[1.0, 0.0, -2.5, 4.0, 8.0]),
            Envelope::quantities(MarkerId(8), &[]),
            Envelope::end_of_exchange(),
        ];
        for env in cases {
            assert_eq!(decode(&env), env);
        }
    }

    #[test]
    fn unknown_envelope_kind_is_malformed() {
        let mut frame = Envelope::end_of_exchange().encode();
        frame[0] = 42;
        assert!(matches!(
            Envelope::decode(&frame),
            Err(CommError::Malformed { .. })
        ));
    }

    #[test]
    fn truncated_envelope_is_malformed() {
        let frame = Envelope::stage(MarkerId(1), 0, &[1.0, 2.0]).encode();
        assert!(Envelope::decode(&frame[..frame.len() - 3]).is_err());
    }

    #[test]
    fn headers_keep_every_field() {
        let mesh = BoxMesh::new(&[0.0, 0.0], &[2.0, 1.0], &[4, 2], 2).unwrap();
        let mut inside = Marker::new(MarkerId(0), MarkerKind::Interface, smallvec![1.3, 0.7], &mesh);
        inside.step = Step::At(3);
        let outside = Marker::new(MarkerId(1), MarkerKind::Volume, smallvec![9.0, 0.5], &mesh);
        let batch = vec![inside, outside];
        let decoded = decode_headers(&encode_headers(&batch)).unwrap();
        assert_eq!(decoded, batch);
    }

    #[test]
    fn absurd_header_count_is_rejected() {
        let mut frame = Vec::new();
        codec::write_u32_le(&mut frame, u32::MAX);
        assert!(matches!(
            decode_headers(&frame),
            Err(CommError::Malformed { .. })
        ));
    }

    #[test]
    fn mid_macro_step_only_between_stages() {
        assert!(!mid_macro_step(Step::At(0), 1));
        assert!(!mid_macro_step(Step::At(4), 2));
        assert!(mid_macro_step(Step::At(5), 2));
        assert!(!mid_macro_step(Step::Done, 3));
    }

    #[test]
    fn single_rank_exchange_is_a_no_op() {
        let mesh = BoxMesh::new(&[0.0], &[1.0], &[4], 1).unwrap();
        let points: Vec<Point> = vec![smallvec![0.1], smallvec![0.9]];
        let mut line = Line::new(&points, &[MarkerKind::Volume; 2], &mesh).unwrap();
        let before = line.clone();
        let mut arena = StageArena::new(2, 1);
        let mut metrics = AdvectMetrics::default();
        let comm = LocalComm::new();
        Exchange {
            comm: &comm,
            mesh: &mesh,
            line: &mut line,
            arena: &mut arena,
            payloads: &mut PayloadStore::default(),
            metrics: &mut metrics,
        }
        .run()
        .unwrap();
        assert_eq!(line, before);
        assert_eq!(metrics, AdvectMetrics::default());
    }

    #[test]
    fn mid_step_state_moves_to_the_new_owner() {
        // Marker 0 sits on rank 0 but its position is already in rank 1's
        // half, halfway through a two-stage macro-step.
        let mesh = BoxMesh::new(&[0.0], &[2.0], &[4], 2).unwrap();
        let out = Cluster::run(&ClusterConfig::with_ranks(2), |comm| {
            let points: Vec<Point> = vec![smallvec![0.9]];
            let mut line = Line::new(&points, &[MarkerKind::Volume], &mesh).map_err(AdvectError::from)?;
            let mut arena = StageArena::new(2, 1);
            if comm.rank() == Rank(0) {
                let m = line.marker_mut(0);
                m.relocate(&mesh, smallvec![1.2], 8);
                m.step = Step::At(1);
                arena.insert(
                    MarkerId(0),
                    StageState {
                        old_position: smallvec![0.9],
                        stages: smallvec![smallvec![0.3], smallvec![0.0]],
                    },
                );
            }
            let mut metrics = AdvectMetrics::default();
            Exchange {
                comm: &comm,
                mesh: &mesh,
                line: &mut line,
                arena: &mut arena,
                payloads: &mut PayloadStore::default(),
                metrics: &mut metrics,
            }
            .run()?;
            line.update_line()?;
            Ok::<_, AdvectError>((line, arena.get(MarkerId(0)).cloned(), metrics))
        })
        .unwrap();

        let (line0, state0, metrics0) = out[0].clone().unwrap();
        let (line1, state1, metrics1) = out[1].clone().unwrap();
        assert_eq!(line0, line1);
        assert_eq!(line1.marker(0).owner, Rank(1));
        assert_eq!(line1.marker(0).step, Step::At(1));
        assert!(state0.is_none());
        let state1 = state1.unwrap();
        assert_eq!(state1.old_position.as_slice(), &[0.9]);
        assert_eq!(state1.stages[0].as_slice(), &[0.3]);
        assert_eq!(metrics0.migrations_sent, 1);
        assert_eq!(metrics1.migrations_received, 1);
    }

    #[test]
    fn exited_marker_is_handed_to_the_sink() {
        let mesh = BoxMesh::new(&[0.0], &[2.0], &[4], 2).unwrap();
        let out = Cluster::run(&ClusterConfig::with_ranks(2), |comm| {
            let points: Vec<Point> = vec![smallvec![1.9]];
            let mut line = Line::new(&points, &[MarkerKind::Volume], &mesh).map_err(AdvectError::from)?;
            let mut arena = StageArena::new(1, 1);
            if comm.rank() == Rank(1) {
                line.marker_mut(0).relocate(&mesh, smallvec![2.4], 8);
            }
            let mut metrics = AdvectMetrics::default();
            Exchange {
                comm: &comm,
                mesh: &mesh,
                line: &mut line,
                arena: &mut arena,
                payloads: &mut PayloadStore::default(),
                metrics: &mut metrics,
            }
            .run()?;
            line.update_line()?;
            Ok::<_, AdvectError>((line, metrics))
        })
        .unwrap();

        let (line0, _) = out[0].clone().unwrap();
        let (line1, metrics1) = out[1].clone().unwrap();
        assert_eq!(line0, line1);
        assert_eq!(line0.outside_count(), 1);
        assert_eq!(line0.offsets(), &[0, 1, 1]);
        assert_eq!(line0.marker(0).position.as_slice(), &[2.4]);
        assert_eq!(metrics1.exit_handoffs, 1);
    }

    #[test]
    fn stray_envelope_is_a_protocol_error() {
        let mesh = BoxMesh::new(&[0.0], &[2.0], &[4], 2).unwrap();
        let out = Cluster::run(&ClusterConfig::with_ranks(2), |comm| {
            let points: Vec<Point> = vec![smallvec![0.1]];
            let mut line = Line::new(&points, &[MarkerKind::Volume], &mesh).map_err(AdvectError::from)?;
            let mut arena = StageArena::new(1, 1);
            if comm.rank() == Rank(1) {
                // A message nobody asked for.
                comm.send(Rank(0), Envelope::step(MarkerId(0), Step::At(1)).encode())?;
            }
            let mut metrics = AdvectMetrics::default();
            Exchange {
                comm: &comm,
                mesh: &mesh,
                line: &mut line,
                arena: &mut arena,
                payloads: &mut PayloadStore::default(),
                metrics: &mut metrics,
            }
            .run()
        })
        .unwrap();

        match &out[0] {
            Err(AdvectError::Protocol(ProtocolError::UnexpectedEnvelope {
                expected, found, from, to, ..
            })) => {
                assert_eq!(*expected, EnvelopeKind::EndOfExchange);
                assert_eq!(*found, EnvelopeKind::Step);
                assert_eq!((*from, *to), (Rank(1), Rank(0)));
            }
            other => panic!("expected a protocol error, got {other:?}"),
        }
    }

    #[test]
    fn owner_without_stage_state_fails_before_sending() {
        // Rank 0 believes marker 0 is mid-step but has lost its state.
        let mesh = BoxMesh::new(&[0.0], &[2.0], &[4], 2).unwrap();
        let out = Cluster::run(&ClusterConfig::with_ranks(2), |comm| {
            let points: Vec<Point> = vec![smallvec![0.9]];
            let mut line = Line::new(&points, &[MarkerKind::Volume], &mesh).map_err(AdvectError::from)?;
            let mut arena = StageArena::new(2, 1);
            if comm.rank() == Rank(0) {
                let m = line.marker_mut(0);
                m.relocate(&mesh, smallvec![1.2], 8);
                m.step = Step::At(1);
            }
            let mut metrics = AdvectMetrics::default();
            Exchange {
                comm: &comm,
                mesh: &mesh,
                line: &mut line,
                arena: &mut arena,
                payloads: &mut PayloadStore::default(),
                metrics: &mut metrics,
            }
            .run()
        })
        .unwrap();

        assert_eq!(
            out[0],
            Err(AdvectError::Protocol(ProtocolError::MissingState {
                marker: MarkerId(0),
                step: Step::At(1),
                rank: Rank(0),
            }))
        );
        assert_eq!(
            out[1],
            Err(AdvectError::Comm(CommError::Disconnected { peer: Rank(0) }))
        );
    }

    #[test]
    fn failed_hand_off_puts_nothing_on_the_wire() {
        let mesh = BoxMesh::new(&[0.0], &[2.0], &[4], 2).unwrap();
        let out = Cluster::run(&ClusterConfig::with_ranks(2), |comm| {
            let points: Vec<Point> = vec![smallvec![0.9]];
            let mut line = Line::new(&points, &[MarkerKind::Volume], &mesh).map_err(AdvectError::from)?;
            if comm.rank() == Rank(1) {
                // Take the header batch, then look for any point-to-point frame.
                comm.broadcast(Rank(0), None)?;
                return match comm.recv(Rank(0)) {
                    Ok(frame) => Ok(Some(Envelope::decode(&frame)?.kind)),
                    Err(CommError::Disconnected { .. }) => Ok(None),
                    Err(e) => Err(AdvectError::from(e)),
                };
            }
            let m = line.marker_mut(0);
            m.relocate(&mesh, smallvec![1.2], 8);
            m.step = Step::At(1);
            let mut metrics = AdvectMetrics::default();
            Exchange {
                comm: &comm,
                mesh: &mesh,
                line: &mut line,
                arena: &mut StageArena::new(2, 1),
                payloads: &mut PayloadStore::default(),
                metrics: &mut metrics,
            }
            .run()?;
            Ok::<_, AdvectError>(None)
        })
        .unwrap();

        assert!(matches!(
            out[0],
            Err(AdvectError::Protocol(ProtocolError::MissingState { .. }))
        ));
        assert_eq!(out[1], Ok(None));
    }

    #[test]
    fn payload_follows_a_migrating_marker() {
        let mesh = BoxMesh::new(&[0.0], &[2.0], &[4], 2).unwrap();
        let out = Cluster::run(&ClusterConfig::with_ranks(2), |comm| {
            let points: Vec<Point> = vec![smallvec![0.9], smallvec![0.1]];
            let mut line =
                Line::new(&points, &[MarkerKind::Volume; 2], &mesh).map_err(AdvectError::from)?;
            let mut payloads = PayloadStore::new(3);
            if comm.rank() == Rank(0) {
                payloads.insert(MarkerId(0), vec![1.0, -2.0, 0.5]);
                payloads.insert(MarkerId(1), vec![7.0, 7.0, 7.0]);
                let slot = line.slot_of(MarkerId(0));
                let m = line.marker_mut(slot);
                m.relocate(&mesh, smallvec![1.4], 8);
                m.step = Step::Done;
            }
            let mut metrics = AdvectMetrics::default();
            Exchange {
                comm: &comm,
                mesh: &mesh,
                line: &mut line,
                arena: &mut StageArena::new(1, 1),
                payloads: &mut payloads,
                metrics: &mut metrics,
            }
            .run()?;
            line.update_line()?;
            Ok::<_, AdvectError>((line, payloads, metrics))
        })
        .unwrap();

        let (line0, payloads0, metrics0) = out[0].clone().unwrap();
        let (line1, payloads1, metrics1) = out[1].clone().unwrap();
        assert_eq!(line0, line1);
        assert_eq!(line0.offsets(), &[0, 1, 2]);
        assert_eq!(payloads0.get(MarkerId(0)), None);
        assert_eq!(payloads0.get(MarkerId(1)), Some(&[7.0, 7.0, 7.0][..]));
        assert_eq!(payloads1.get(MarkerId(0)), Some(&[1.0, -2.0, 0.5][..]));
        assert_eq!(payloads1.len(), 1);
        assert_eq!(metrics0.migrations_sent, 1);
        assert_eq!(metrics1.migrations_received, 1);
    }

    #[test]
    fn owner_without_payload_is_a_protocol_error() {
        let mesh = BoxMesh::new(&[0.0], &[2.0], &[4], 2).unwrap();
        let out = Cluster::run(&ClusterConfig::with_ranks(2), |comm| {
            let points: Vec<Point> = vec![smallvec![0.9]];
            let mut line = Line::new(&points, &[MarkerKind::Volume], &mesh).map_err(AdvectError::from)?;
            if comm.rank() == Rank(0) {
                line.marker_mut(0).relocate(&mesh, smallvec![1.4], 8);
            }
            let mut metrics = AdvectMetrics::default();
            Exchange {
                comm: &comm,
                mesh: &mesh,
                line: &mut line,
                arena: &mut StageArena::new(1, 1),
                payloads: &mut PayloadStore::new(2),
                metrics: &mut metrics,
            }
            .run()
        })
        .unwrap();

        assert_eq!(
            out[0],
            Err(AdvectError::Protocol(ProtocolError::MissingPayload {
                marker: MarkerId(0),
                rank: Rank(0),
            }))
        );
        assert!(matches!(out[1], Err(AdvectError::Comm(_))));
    }

    #[test]
    fn exited_marker_drops_its_payload() {
        let mesh = BoxMesh::new(&[0.0], &[2.0], &[4], 2).unwrap();
        let out = Cluster::run(&ClusterConfig::with_ranks(2), |comm| {
            let points: Vec<Point> = vec![smallvec![0.1], smallvec![1.9]];
            let mut line =
                Line::new(&points, &[MarkerKind::Volume; 2], &mesh).map_err(AdvectError::from)?;
            let mut payloads = PayloadStore::new(1);
            let me = comm.rank();
            let (id, x) = if me == Rank(0) {
                (MarkerId(0), -0.3)
            } else {
                (MarkerId(1), 2.3)
            };
            payloads.insert(id, vec![f64::from(me.0)]);
            let slot = line.slot_of(id);
            line.marker_mut(slot).relocate(&mesh, smallvec![x], 8);
            let mut metrics = AdvectMetrics::default();
            Exchange {
                comm: &comm,
                mesh: &mesh,
                line: &mut line,
                arena: &mut StageArena::new(1, 1),
                payloads: &mut payloads,
                metrics: &mut metrics,
            }
            .run()?;
            line.update_line()?;
            Ok::<_, AdvectError>((line, payloads))
        })
        .unwrap();

        for r in &out {
            let (line, payloads) = r.clone().unwrap();
            assert!(payloads.is_empty());
            assert_eq!(line.outside_count(), 2);
        }
    }
}
