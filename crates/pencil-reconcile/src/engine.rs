use std::collections::HashSet;

use crate::{InstanceRecord, ReconcilePlan};

/// Deterministic diff between what the registry knows and what is running:
/// - every running record whose id is not registered => register (source order)
/// - every registered id with no running record => deregister (sink order)
///
/// Matching is by id only. Tags are carried into registrations but never
/// compared, so a tag change alone does not cause re-registration.
///
/// An id can never land on both sides: `to_register` only holds ids absent
/// from `registered_ids`, `to_deregister` only holds ids absent from
/// `running`.
pub fn compute_plan(registered_ids: &[String], running: &[InstanceRecord]) -> ReconcilePlan {
    let registered: HashSet<&str> = registered_ids.iter().map(String::as_str).collect();
    let running_ids: HashSet<&str> = running.iter().map(|r| r.id.as_str()).collect();

    let mut to_register: Vec<InstanceRecord> = Vec::new();
    let mut queued: HashSet<&InstanceRecord> = HashSet::new();
    for record in running {
        if registered.contains(record.id.as_str()) {
            continue;
        }
        // Exact duplicates collapse; distinct ports of one id do not.
        if !queued.insert(record) {
            continue;
        }
        to_register.push(record.clone());
    }

    let mut seen: HashSet<&str> = HashSet::new();
    let mut to_deregister: Vec<String> = Vec::new();
    for id in registered_ids {
        if running_ids.contains(id.as_str()) || !seen.insert(id.as_str()) {
            continue;
        }
        to_deregister.push(id.clone());
    }

    ReconcilePlan {
        to_register,
        to_deregister,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ids(v: &[&str]) -> Vec<String> {
        v.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn empty_registry_registers_every_port() {
        let running = vec![
            InstanceRecord::new("c1", "sshd", 22),
            InstanceRecord::new("c1", "sshd", 8000),
        ];
        let plan = compute_plan(&[], &running);
        assert_eq!(plan.to_register, running);
        assert!(plan.to_deregister.is_empty());
    }

    #[test]
    fn consistent_state_is_noop() {
        let running = vec![InstanceRecord::new("c1", "sshd", 22)];
        let plan = compute_plan(&ids(&["c1"]), &running);
        assert!(plan.is_empty());
    }

    #[test]
    fn stale_id_is_deregistered() {
        let running = vec![InstanceRecord::new("c1", "sshd", 22)];
        let plan = compute_plan(&ids(&["c1", "c2"]), &running);
        assert!(plan.to_register.is_empty());
        assert_eq!(plan.to_deregister, ids(&["c2"]));
    }

    #[test]
    fn replacement_registers_new_and_deregisters_old() {
        let running = vec![InstanceRecord::new("c2", "api", 9000)];
        let plan = compute_plan(&ids(&["c1"]), &running);
        assert_eq!(plan.to_register, running);
        assert_eq!(plan.to_deregister, ids(&["c1"]));
    }

    #[test]
    fn registration_order_follows_source_order() {
        let running = vec![
            InstanceRecord::new("z", "z", 1),
            InstanceRecord::new("a", "a", 2),
            InstanceRecord::new("m", "m", 3),
        ];
        let plan = compute_plan(&[], &running);
        let got: Vec<&str> = plan.to_register.iter().map(|r| r.id.as_str()).collect();
        assert_eq!(got, vec!["z", "a", "m"]);
    }

    #[test]
    fn exact_duplicate_records_collapse() {
        let r = InstanceRecord::new("c1", "web", 80).with_tags(["x"]);
        let plan = compute_plan(&[], &[r.clone(), r.clone()]);
        assert_eq!(plan.to_register, vec![r]);
    }

    #[test]
    fn interleaved_duplicates_keep_first_seen_order() {
        let a80 = InstanceRecord::new("a", "web", 80);
        let a81 = InstanceRecord::new("a", "web", 81);
        let retagged = InstanceRecord::new("a", "web", 80).with_tags(["x"]);
        let b = InstanceRecord::new("b", "db", 5432);
        let running = vec![
            a80.clone(),
            b.clone(),
            a81.clone(),
            a80.clone(),
            retagged.clone(),
            b.clone(),
            a81.clone(),
        ];
        let plan = compute_plan(&[], &running);
        assert_eq!(plan.to_register, vec![a80, b, a81, retagged]);
        for (i, r) in plan.to_register.iter().enumerate() {
            assert!(!plan.to_register[i + 1..].iter().any(|o| o.same_as(r)));
        }
    }

    #[test]
    fn large_duplicate_heavy_input_collapses() {
        let mut running = Vec::new();
        for _ in 0..50 {
            for i in 0..200u16 {
                running.push(InstanceRecord::new(format!("c{i}"), "svc", 1000 + i));
            }
        }
        let plan = compute_plan(&[], &running);
        assert_eq!(plan.to_register.len(), 200);
        assert_eq!(plan.to_register[0], InstanceRecord::new("c0", "svc", 1000));
        assert_eq!(plan.to_register[199], InstanceRecord::new("c199", "svc", 1199));
    }

    #[test]
    fn repeated_registered_id_deregistered_once() {
        let plan = compute_plan(&ids(&["c9", "c9"]), &[]);
        assert_eq!(plan.to_deregister, ids(&["c9"]));
    }

    #[test]
    fn tag_change_alone_does_not_reregister() {
        let running = vec![InstanceRecord::new("c1", "web", 80).with_tags(["new"])];
        let plan = compute_plan(&ids(&["c1"]), &running);
        assert!(plan.is_empty());
    }

    #[test]
    fn no_id_on_both_sides() {
        let registered = ids(&["a", "b", "c", "d"]);
        let running = vec![
            InstanceRecord::new("b", "b", 1),
            InstanceRecord::new("d", "d", 2),
            InstanceRecord::new("e", "e", 3),
            InstanceRecord::new("f", "f", 4),
        ];
        let plan = compute_plan(&registered, &running);
        for r in &plan.to_register {
            assert!(!plan.to_deregister.contains(&r.id));
        }
        assert_eq!(plan.to_deregister, ids(&["a", "c"]));
        let reg: Vec<&str> = plan.to_register.iter().map(|r| r.id.as_str()).collect();
        assert_eq!(reg, vec!["e", "f"]);
    }

    #[test]
    fn registered_subset_of_running_registers_only_missing() {
        let running = vec![
            InstanceRecord::new("a", "a", 1),
            InstanceRecord::new("b", "b", 2),
        ];
        let plan = compute_plan(&ids(&["a"]), &running);
        assert!(plan.to_deregister.is_empty());
        assert_eq!(plan.to_register, vec![InstanceRecord::new("b", "b", 2)]);

        // Once applied, the same inputs produce nothing.
        let plan = compute_plan(&ids(&["a", "b"]), &running);
        assert!(plan.is_empty());
    }
}
