//! A coupled solver moves markers itself and hands the positions back:
//! payloads must follow their markers across the partition boundary.

use std::sync::Arc;

use smallvec::smallvec;
use wake_comm::Communicator;
use wake_core::{MarkerId, MarkerKind, Point, Rank};
use wake_engine::{AdvectError, AdvectMetrics, Line, Tracker, TrackerConfig};
use wake_mesh::Mesh;
use wake_test_utils::{on_cluster, split_strip};

struct RankResult {
    payloads: Vec<Option<Vec<f64>>>,
    first: AdvectMetrics,
    line: Line,
    returned: Option<Vec<f64>>,
}

fn start() -> Vec<Point> {
    vec![
        smallvec![0.2, 0.5],
        smallvec![0.6, 0.5],
        smallvec![1.4, 0.5],
        smallvec![1.8, 0.5],
    ]
}

fn run() -> Vec<RankResult> {
    on_cluster(2, |comm| {
        let mesh: Arc<dyn Mesh> = Arc::new(split_strip(2));
        let points = start();
        let me = comm.rank();
        let config = TrackerConfig {
            payload_width: 2,
            ..TrackerConfig::default()
        };
        let mut tracker = Tracker::new(config, &points, &[MarkerKind::Volume; 4], mesh, comm)?;
        for id in 0..4u32 {
            let values = [f64::from(id + 1), 10.0 * f64::from(id + 1)];
            if tracker.payload(MarkerId(id)).is_some() {
                tracker.set_payload(MarkerId(id), &values)?;
            }
        }

        // 0 crosses right, 2 crosses left, 3 leaves the domain.
        let moved: Vec<Point> = vec![
            smallvec![1.2, 0.5],
            smallvec![0.7, 0.5],
            smallvec![0.3, 0.5],
            smallvec![2.5, 0.5],
        ];
        let first = tracker.migrate(&moved)?;
        let payloads = (0..4)
            .map(|id| tracker.payload(MarkerId(id)).map(<[f64]>::to_vec))
            .collect();
        let line = tracker.line().clone();

        let mut back = moved.clone();
        back[0] = smallvec![0.8, 0.5];
        tracker.migrate(&back)?;
        let returned = if me == Rank(0) {
            tracker.payload(MarkerId(0)).map(<[f64]>::to_vec)
        } else {
            None
        };

        Ok::<_, AdvectError>(RankResult {
            payloads,
            first,
            line,
            returned,
        })
    })
}

#[test]
fn payloads_follow_their_markers() {
    let out = run();
    let (r0, r1) = (&out[0], &out[1]);

    assert_eq!(r0.payloads[0], None);
    assert_eq!(r1.payloads[0], Some(vec![1.0, 10.0]));
    assert_eq!(r0.payloads[1], Some(vec![2.0, 20.0]));
    assert_eq!(r0.payloads[2], Some(vec![3.0, 30.0]));
    assert_eq!(r1.payloads[2], None);
    assert!(r0.payloads[3].is_none() && r1.payloads[3].is_none());
}

#[test]
fn layout_and_counts_after_migration() {
    let out = run();
    assert_eq!(out[0].line, out[1].line);
    let line = &out[0].line;
    assert_eq!(line.offsets(), &[0, 3, 4]);
    assert_eq!(line.outside_count(), 1);
    assert!(line.check_invariants().is_ok());

    let (m0, m1) = (&out[0].first, &out[1].first);
    assert_eq!((m0.migrations_sent, m0.migrations_received), (1, 1));
    assert_eq!((m1.migrations_sent, m1.migrations_received), (1, 1));
    assert_eq!((m0.exited, m1.exited), (0, 1));
    assert_eq!(m1.exit_handoffs, 1);
}

#[test]
fn payload_returns_with_its_marker() {
    let out = run();
    assert_eq!(out[0].returned, Some(vec![1.0, 10.0]));
}
