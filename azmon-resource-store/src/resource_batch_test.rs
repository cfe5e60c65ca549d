#[cfg(test)]
mod tests {
    use crate::{
        MetricDefinition, Resource, ResourceBatch, ResourceType, Set, StoreError,
    };

    const VM_TYPE: &str = "Microsoft.Compute/virtualMachines";
    const DISK_TYPE: &str = "Microsoft.Compute/disks";

    fn vm_id(name: &str) -> String {
        format!(
            "/subscriptions/sub-1/resourceGroups/rg-1/providers/Microsoft.Compute/virtualMachines/{}",
            name
        )
    }

    fn disk_id(name: &str) -> String {
        format!(
            "/subscriptions/sub-1/resourceGroups/rg-1/providers/Microsoft.Compute/disks/{}",
            name
        )
    }

    fn vm(name: &str) -> Resource {
        Resource::new(vm_id(name), VM_TYPE).with_name(name)
    }

    fn vm_batch(names: &[&str]) -> ResourceBatch {
        let mut batch = ResourceBatch::new(VM_TYPE).unwrap();
        for name in names {
            batch.add_resource(vm(name)).unwrap();
        }
        batch
    }

    fn ids(names: &[&str]) -> Vec<String> {
        let mut ids: Vec<String> = names.iter().map(|n| vm_id(n)).collect();
        ids.sort();
        ids
    }

    #[test]
    fn test_new_accepts_type_or_id() {
        let from_type = ResourceBatch::new(VM_TYPE).unwrap();
        let from_id = ResourceBatch::new(&vm_id("a")).unwrap();
        assert_eq!(from_type.resource_type(), from_id.resource_type());
        assert!(from_type.is_empty());

        assert!(matches!(
            ResourceBatch::new(""),
            Err(StoreError::InvalidResourceType { .. })
        ));
    }

    /// Test: strict single add
    ///
    /// Purpose
    /// - Validate the checks `add_resource` applies before inserting
    ///
    /// Expected
    /// - Resources of another type, without a type or already known are refused
    /// - A refused resource leaves the batch unchanged
    #[test]
    fn test_add_resource_validation() {
        let mut batch = vm_batch(&["a"]);

        assert_eq!(
            batch.add_resource(vm("a")),
            Err(StoreError::DuplicateResource(vm_id("a")))
        );

        let disk = Resource::new(disk_id("d"), DISK_TYPE);
        assert!(matches!(
            batch.add_resource(disk),
            Err(StoreError::ResourceTypeMismatch { .. })
        ));

        let mut untyped = Resource::default();
        untyped.id = Some(vm_id("b"));
        assert_eq!(
            batch.add_resource(untyped),
            Err(StoreError::MissingResourceType(vm_id("b")))
        );

        assert_eq!(batch.resource_ids(), ids(&["a"]));
    }

    #[test]
    fn test_add_resource_ignores_type_casing() {
        let mut batch = vm_batch(&[]);
        let lower = Resource::new(vm_id("a"), "microsoft.compute/VIRTUALMACHINES");
        batch.add_resource(lower).unwrap();
        assert_eq!(batch.len(), 1);
    }

    #[test]
    fn test_add_definition_requires_known_resource() {
        let mut batch = vm_batch(&["a"]);

        let orphan = MetricDefinition::new("cpu", VM_TYPE, vm_id("ghost"));
        assert_eq!(
            batch.add_definition(orphan),
            Err(StoreError::ResourceNotFound(vm_id("ghost")))
        );

        batch
            .add_definition(MetricDefinition::new("cpu", VM_TYPE, vm_id("a")))
            .unwrap();
        assert!(batch.get_definition(VM_TYPE, "cpu").is_some());

        let foreign = MetricDefinition::new("iops", DISK_TYPE, disk_id("d"));
        assert!(matches!(
            batch.add_definition(foreign),
            Err(StoreError::ResourceTypeMismatch { .. })
        ));
    }

    /// Test: best-effort bulk definitions
    ///
    /// Purpose
    /// - One bad definition must not block the rest of the bulk call
    ///
    /// Flow
    /// - Store three definitions, one of them for a disk
    ///
    /// Expected
    /// - The two VM definitions are stored
    /// - Exactly one item error, a type mismatch
    #[test]
    fn test_store_definitions_best_effort() {
        let mut batch = vm_batch(&["a"]);
        let defs = vec![
            MetricDefinition::new("cpu", VM_TYPE, vm_id("a")),
            MetricDefinition::new("iops", DISK_TYPE, disk_id("d")),
            MetricDefinition::new("network in", VM_TYPE, vm_id("a")),
        ];

        let outcome = batch.store_definitions(&defs);

        assert_eq!(outcome.stored, 2);
        assert_eq!(outcome.errors.len(), 1);
        assert!(matches!(
            outcome.errors[0],
            StoreError::ResourceTypeMismatch { .. }
        ));
        assert_eq!(
            batch.namespace_metric_names(VM_TYPE).unwrap(),
            vec!["cpu", "network in"]
        );

        let joined = outcome.into_result().unwrap_err();
        assert_eq!(joined.len(), 1);
    }

    #[test]
    fn test_store_definitions_reports_malformed_items() {
        let mut batch = vm_batch(&["a"]);
        let no_namespace = MetricDefinition {
            name: Some("cpu".to_string()),
            resource_id: Some(vm_id("a")),
            ..Default::default()
        };
        let no_resource = MetricDefinition {
            name: Some("cpu".to_string()),
            namespace: Some(VM_TYPE.to_string()),
            ..Default::default()
        };

        let outcome = batch.store_definitions(&[no_namespace, no_resource]);

        assert_eq!(outcome.stored, 0);
        assert_eq!(
            outcome.errors,
            vec![
                StoreError::MissingNamespace("cpu".to_string()),
                StoreError::MissingResourceId,
            ]
        );
        assert!(batch.namespaces().is_empty());
    }

    #[test]
    fn test_store_definitions_last_write_wins() {
        let mut batch = vm_batch(&["a"]);
        let first = MetricDefinition::new("cpu", VM_TYPE, vm_id("a")).with_unit("Count");
        let second = MetricDefinition::new("cpu", VM_TYPE, vm_id("a")).with_unit("Percent");

        batch.store_definitions(&[first]);
        batch.store_definitions(&[second.clone()]);

        assert_eq!(batch.definitions()[VM_TYPE].len(), 1);
        assert_eq!(batch.get_definition(VM_TYPE, "cpu"), Some(&second));
    }

    /// Test: reconciliation against a fresh listing
    ///
    /// Purpose
    /// - Validate the stale set and the refresh of known resources
    ///
    /// Flow
    /// - Seed {A,B,C}, reconcile with [B,C,D] where B carries new tags
    /// - Evict the returned stale set
    ///
    /// Expected
    /// - Stale set is {A} and nothing is evicted by the store call itself
    /// - After eviction membership is {B,C,D}, B refreshed and D inserted
    #[test]
    fn test_store_resources_reconciliation() {
        let mut batch = vm_batch(&["A", "B", "C"]);

        let listing = vec![
            vm("B").with_tag("env", "prod"),
            vm("C"),
            vm("D").with_location("westeurope"),
        ];
        let reconciliation = batch.store_resources(listing);

        assert!(reconciliation.is_clean());
        assert_eq!(reconciliation.stored, 3);
        assert_eq!(reconciliation.stale, [vm_id("A")].into_iter().collect::<Set>());
        assert_eq!(batch.len(), 4);

        let deleted = batch.delete_resources(reconciliation.stale.iter());
        assert_eq!(deleted.stored, 1);

        assert_eq!(batch.resource_ids(), ids(&["B", "C", "D"]));
        let b = batch.resource(&vm_id("B")).unwrap();
        assert_eq!(b.tags.get("env").map(String::as_str), Some("prod"));
        let d = batch.resource(&vm_id("D")).unwrap();
        assert_eq!(d.location.as_deref(), Some("westeurope"));
    }

    #[test]
    fn test_store_resources_is_idempotent() {
        let mut batch = vm_batch(&[]);
        let listing = || vec![vm("a"), vm("b")];

        let first = batch.store_resources(listing());
        assert!(first.stale.is_empty());
        let second = batch.store_resources(listing());

        assert!(second.stale.is_empty());
        assert_eq!(second.stored, 2);
        assert_eq!(batch.resource_ids(), ids(&["a", "b"]));
    }

    #[test]
    fn test_store_resources_rejected_items_stay_stale() {
        let mut batch = vm_batch(&["a", "b"]);

        // "a" comes back without a type, "b" comes back as a disk
        let mut untyped = Resource::default();
        untyped.id = Some(vm_id("a"));
        let wrong_type = Resource::new(vm_id("b"), DISK_TYPE);
        let reconciliation = batch.store_resources(vec![untyped, wrong_type, vm("c")]);

        assert_eq!(reconciliation.stored, 1);
        assert_eq!(reconciliation.errors.len(), 2);
        assert_eq!(
            reconciliation.errors[0],
            StoreError::MissingResourceType(vm_id("a"))
        );
        assert_eq!(reconciliation.stale.to_sorted_vec(), ids(&["a", "b"]));
        // rejected items never overwrite what is stored
        assert_eq!(
            batch.resource(&vm_id("b")).unwrap().resource_type.as_deref(),
            Some(VM_TYPE)
        );
    }

    #[test]
    fn test_store_resources_keeps_per_resource_definitions() {
        let mut batch = vm_batch(&["a"]);
        let custom = MetricDefinition::new("mem", "azure.vm.guest", vm_id("a"));
        batch
            .store_resource_definitions(&vm_id("a"), &[custom])
            .unwrap();

        batch.store_resources(vec![vm("a").with_tag("env", "dev")]);

        let a = batch.resource(&vm_id("a")).unwrap();
        assert!(a.get_definition("mem").is_some());
        assert_eq!(a.tags.len(), 1);
    }

    #[test]
    fn test_replace_resource_definitions() {
        let mut batch = vm_batch(&["a"]);
        batch
            .store_resource_definitions(
                &vm_id("a"),
                &[
                    MetricDefinition::new("mem", "azure.vm.guest", vm_id("a")),
                    MetricDefinition::new("gone", "azure.vm.guest", vm_id("a")),
                ],
            )
            .unwrap();

        let outcome = batch
            .replace_resource_definitions(
                &vm_id("a"),
                &[MetricDefinition::new("mem", "azure.vm.guest", vm_id("a"))],
            )
            .unwrap();
        assert_eq!(outcome.stored, 1);
        let a = batch.resource(&vm_id("a")).unwrap();
        assert!(a.get_definition("mem").is_some());
        assert!(a.get_definition("gone").is_none());

        assert_eq!(
            batch.replace_resource_definitions(&vm_id("x"), &[]),
            Err(StoreError::ResourceNotFound(vm_id("x")))
        );
    }

    /// Test: resource IDs match ignoring case
    ///
    /// Purpose
    /// - The upstream API spells the same ID with different casings from
    ///   different endpoints
    ///
    /// Expected
    /// - Definitions, lookups, refreshes and deletes find the resource
    /// - A re-listing in another casing is not reported stale
    #[test]
    fn test_resource_ids_ignore_case() {
        let mut batch = vm_batch(&["a"]);
        let upper = vm_id("a").to_uppercase();

        assert!(batch.resource(&upper).is_some());
        batch
            .add_definition(MetricDefinition::new("cpu", VM_TYPE, upper.as_str()))
            .unwrap();
        assert!(matches!(
            batch.add_resource(Resource::new(upper.as_str(), VM_TYPE)),
            Err(StoreError::DuplicateResource(_))
        ));

        let reconciliation = batch.store_resources(vec![Resource::new(upper.as_str(), VM_TYPE)]);
        assert!(reconciliation.stale.is_empty());
        assert_eq!(batch.len(), 1);
        // the latest listing's spelling wins
        assert_eq!(batch.resource_ids(), vec![upper.clone()]);

        let reconciliation = batch.store_resources(Vec::new());
        assert_eq!(reconciliation.stale.to_sorted_vec(), vec![upper]);

        let outcome = batch.delete_resources([vm_id("a")]);
        assert_eq!(outcome.stored, 1);
        assert!(batch.is_empty());
    }

    #[test]
    fn test_store_resource_definitions_unknown_resource() {
        let mut batch = vm_batch(&[]);
        let result = batch.store_resource_definitions(&vm_id("x"), &[]);
        assert_eq!(result, Err(StoreError::ResourceNotFound(vm_id("x"))));
    }

    #[test]
    fn test_delete_resources_reports_missing() {
        let mut batch = vm_batch(&["a", "b"]);
        let outcome = batch.delete_resources([vm_id("a"), vm_id("zzz")]);

        assert_eq!(outcome.stored, 1);
        assert_eq!(
            outcome.errors,
            vec![StoreError::ResourceNotFound(vm_id("zzz"))]
        );
        assert_eq!(batch.resource_ids(), ids(&["b"]));
    }

    /// Test: purge of shared definitions on last eviction
    ///
    /// Expected
    /// - Definitions survive while one resource of the type remains
    /// - Deleting the last resource drops them, and the namespace is gone
    #[test]
    fn test_delete_last_resource_purges_definitions() {
        let mut batch = vm_batch(&["a", "b"]);
        batch.store_definitions(&[MetricDefinition::new("cpu", VM_TYPE, vm_id("a"))]);

        batch.delete_resources([vm_id("a")]);
        assert_eq!(batch.namespace_metric_names(VM_TYPE).unwrap(), vec!["cpu"]);

        batch.delete_resources([vm_id("b")]);
        assert!(batch.is_empty());
        assert_eq!(
            batch.namespace_metric_names(VM_TYPE),
            Err(StoreError::NamespaceNotFound(VM_TYPE.to_string()))
        );
    }

    #[test]
    fn test_find_definition_across_namespaces() {
        let mut batch = vm_batch(&["a"]);
        batch.store_definitions(&[
            MetricDefinition::new("cpu", VM_TYPE, vm_id("a")),
            MetricDefinition::new("disk queue", "microsoft.compute/virtualmachines/guest", vm_id("a")),
        ]);

        assert_eq!(batch.namespaces().len(), 2);
        let found = batch.find_definition("disk queue").unwrap();
        assert_eq!(
            found.namespace.as_deref(),
            Some("microsoft.compute/virtualmachines/guest")
        );
        assert!(batch.find_definition("nope").is_none());
    }

    #[test]
    fn test_range_stops_early() {
        let batch = vm_batch(&["a", "b", "c"]);

        let mut visited = Vec::new();
        batch.range(|id, _| {
            visited.push(id.to_string());
            visited.len() < 2
        });
        assert_eq!(visited, ids(&["a", "b"]));

        let mut all = 0;
        batch.range(|_, _| {
            all += 1;
            true
        });
        assert_eq!(all, 3);
    }

    /// Test: type homogeneity of everything the batch accepted
    ///
    /// Flow
    /// - Feed a mix of VM and disk resources and definitions through every
    ///   write path
    ///
    /// Expected
    /// - Every stored resource and definition parses to the batch type
    #[test]
    fn test_type_homogeneity() {
        let mut batch = vm_batch(&[]);
        let _ = batch.add_resource(Resource::new(disk_id("d1"), DISK_TYPE));
        batch.store_resources(vec![
            vm("a"),
            Resource::new(disk_id("d2"), DISK_TYPE),
            vm("b"),
        ]);
        batch.store_definitions(&[
            MetricDefinition::new("cpu", VM_TYPE, vm_id("a")),
            MetricDefinition::new("iops", DISK_TYPE, disk_id("d2")),
        ]);
        let _ = batch.add_definition(MetricDefinition::new("iops", DISK_TYPE, disk_id("d2")));

        let expected = ResourceType::parse(VM_TYPE).unwrap();
        batch.range(|id, resource| {
            assert_eq!(ResourceType::parse(id).unwrap(), expected);
            assert!(expected.matches(resource.resource_type.as_deref().unwrap()));
            true
        });
        for metrics in batch.definitions().values() {
            for def in metrics.values() {
                assert_eq!(def.resource_type().unwrap(), expected);
            }
        }
        assert_eq!(batch.len(), 2);
    }
}
