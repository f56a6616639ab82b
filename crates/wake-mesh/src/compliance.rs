//! Mesh trait compliance test helpers.
//!
//! These functions verify that a Mesh implementation satisfies the
//! invariants the tracker relies on. Reused across backend test modules.

use crate::mesh::Mesh;
use wake_core::ElementId;

/// Assert that the basis sums to one at the centre and at every corner.
pub fn assert_partition_of_unity(mesh: &dyn Mesh) {
    let dim = mesh.dim();
    for e in 0..mesh.element_count() as u32 {
        let element = ElementId(e);
        let centre = vec![0.0; dim];
        let sum: f64 = mesh.evaluate_basis(element, &centre).iter().sum();
        assert!((sum - 1.0).abs() < 1e-12, "element {e}: basis sum {sum}");
        for corner in 0..1usize << dim {
            let xi: Vec<f64> = (0..dim)
                .map(|d| if corner & (1 << d) != 0 { 1.0 } else { -1.0 })
                .collect();
            let phi = mesh.evaluate_basis(element, &xi);
            let sum: f64 = phi.iter().sum();
            assert!((sum - 1.0).abs() < 1e-12, "element {e}: corner sum {sum}");
            assert_eq!(phi.len(), mesh.element_dofs(element).len());
        }
    }
}

/// Assert that every element's owner is a valid rank.
pub fn assert_owners_in_range(mesh: &dyn Mesh) {
    for e in 0..mesh.element_count() as u32 {
        let owner = mesh.element_owner(ElementId(e));
        assert!(
            owner.index() < mesh.rank_count(),
            "element {e} owned by rank {owner}, only {} ranks",
            mesh.rank_count()
        );
    }
}

/// Assert that located points invert inside their element.
pub fn assert_locate_inverts(mesh: &dyn Mesh, samples: &[Vec<f64>]) {
    for p in samples {
        if let Some(e) = mesh.locate_element(None, p) {
            assert!(
                mesh.to_reference(e, p).is_some(),
                "{p:?} located in {e} but does not invert there"
            );
        }
    }
}

/// Assert that a neighbour walk from every element reaches the element
/// that global location reports, without leaving the mesh.
pub fn assert_walk_reaches_located(mesh: &dyn Mesh, samples: &[Vec<f64>]) {
    for p in samples {
        let Some(target) = mesh.locate_element(None, p) else {
            continue;
        };
        for e in 0..mesh.element_count() as u32 {
            let mut current = ElementId(e);
            let mut hops = 0;
            while mesh.to_reference(current, p).is_none() {
                current = mesh
                    .neighbour_toward(current, p)
                    .unwrap_or_else(|| panic!("walk from {e} toward {p:?} hit the boundary"));
                hops += 1;
                assert!(hops <= mesh.element_count(), "walk from {e} toward {p:?} cycles");
            }
            assert!(mesh.to_reference(target, p).is_some());
        }
    }
}

/// Run all compliance checks.
pub fn run_full_compliance(mesh: &dyn Mesh, samples: &[Vec<f64>]) {
    assert_partition_of_unity(mesh);
    assert_owners_in_range(mesh);
    assert_locate_inverts(mesh, samples);
    assert_walk_reaches_located(mesh, samples);
}
