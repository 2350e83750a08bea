use crate::error::{Error, Result};
use crate::hash::{engine_shard, murmur_mod};
use crate::metadata::IndexMetadata;
use crate::routing::RoutingStrategy;

/// Registry identifier for [`ShardRoutingV1`].
pub const ROUTING_STRATEGY_V1: &str = "v1";

/// First-generation routing: a tenant's documents land on a contiguous ring
/// of `num_shards_per_org` shards starting at a murmur-derived base shard.
///
/// Putting all of a tenant's data on one shard with consistent hashing keeps
/// read fan-out at one shard but hotspots whichever shard a large tenant
/// lands on. Making the per-tenant span configurable trades a little read
/// fan-out for write balance. Which shard of the span a document gets is
/// decided by hashing the document id.
///
/// The emitted hint is a short decimal string the engine's own routing hash
/// maps to the chosen shard, so the caller picks the shard by routing string
/// alone.
#[derive(Debug, Clone)]
pub struct ShardRoutingV1 {
    num_shards: u32,
    num_shards_per_org: u32,
    /// `shard_to_hint[s]` routes to shard `s` under the engine's hash.
    shard_to_hint: Vec<String>,
}

impl ShardRoutingV1 {
    pub fn new(num_shards: u32, num_shards_per_org: u32) -> Result<Self> {
        if num_shards_per_org == 0 {
            return Err(Error::config("numShardsPerOrg must be >= 1"));
        }
        if num_shards < num_shards_per_org {
            return Err(Error::config(format!(
                "misconfigured, numShards ({}) must be >= numShardsPerOrg ({})",
                num_shards, num_shards_per_org
            )));
        }
        Ok(Self {
            num_shards,
            num_shards_per_org,
            shard_to_hint: build_hint_table(num_shards),
        })
    }

    pub fn from_metadata(meta: &IndexMetadata) -> Result<Self> {
        Self::new(meta.num_shards, meta.num_shards_per_org)
    }

    fn tenant_shard(&self, tenant_id: &str) -> u32 {
        murmur_mod(tenant_id, self.num_shards)
    }
}

/// Probe integers `0, 1, 2, ...` and record, per shard, the first decimal
/// string the engine's hash maps there. Decimal strings hit every residue
/// quickly, so the loop terminates after a handful of probes for realistic
/// shard counts.
fn build_hint_table(num_shards: u32) -> Vec<String> {
    let mut table: Vec<Option<String>> = vec![None; num_shards as usize];
    let mut remaining = num_shards as usize;
    let mut probe: u64 = 0;
    while remaining > 0 {
        let hint = probe.to_string();
        let shard = engine_shard(&hint, num_shards) as usize;
        if table[shard].is_none() {
            table[shard] = Some(hint);
            remaining -= 1;
        }
        probe += 1;
    }
    table.into_iter().flatten().collect()
}

impl RoutingStrategy for ShardRoutingV1 {
    fn name(&self) -> &'static str {
        ROUTING_STRATEGY_V1
    }

    fn num_shards(&self) -> u32 {
        self.num_shards
    }

    fn num_shards_per_org(&self) -> u32 {
        self.num_shards_per_org
    }

    fn routing_hint(&self, tenant_id: &str, doc_id: &str) -> String {
        let offset = murmur_mod(doc_id, self.num_shards_per_org);
        let target = (self.tenant_shard(tenant_id) + offset) % self.num_shards;
        self.shard_to_hint[target as usize].clone()
    }

    fn possible_hints(&self, tenant_id: &str) -> Vec<String> {
        let base = self.tenant_shard(tenant_id);
        (0..self.num_shards_per_org)
            .map(|offset| {
                let target = (base + offset) % self.num_shards;
                self.shard_to_hint[target as usize].clone()
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    // Fixed ids rather than random ones so a failure is reproducible.
    const TENANT_IDS: [&str; 15] = [
        "ed1121bf-5e61-4ac5-ad99-c24f8c4f79db",
        "b8864a7e-98d9-4bef-af1e-54c8bea7ae40",
        "decccc4f-2c96-4f4c-890f-eb1433ff4c90",
        "1650943b-b125-41cf-9729-3bd3e164da16",
        "005a22cc-afbb-4bbe-97e9-6f1447293ed7",
        "e29469e1-02a1-4d63-91ef-40affca740a8",
        "400cdb2f-7573-444e-9612-e218ff1c8387",
        "aec66b84-6c34-466b-8991-031cba01241b",
        "53adf13e-ce20-4112-9809-6aa29c60dfa5",
        "f7f8ff19-81bf-49b1-a896-e996674d5a1f",
        "2eb8db9f-d3ae-4d9a-ac78-55cb792e0d2d",
        "3b984743-49bd-47d9-b38f-da3f822db03a",
        "b68edfd1-305f-4d31-9443-605ba05eb5cc",
        "0c8ce21d-3bb5-4dab-9531-1e2f3320259e",
        "254f6bec-8b3d-48d2-976a-ba4a3517558b",
    ];

    const DOC_IDS: [&str; 13] = [
        "0a3fe8fa-0291-4a28-87c7-2eeeda2295cd",
        "38b261be-23c4-4fe6-846c-f06231ddf82f",
        "3e4602bb-9c72-4174-b29f-b72dee356716",
        "3ff398ac-b832-4085-9ba3-0d2756c03f21",
        "8773bd12-3fdc-452f-b440-60bee40fadfc",
        "a0f20cbe-19a4-4aff-833d-c0919d6cfe73",
        "de48d484-23ce-4e0d-b465-de91b2f6ad72",
        "be57d96e-7ee8-4bba-bc35-15e347b69bed",
        "7cb1b182-b64a-4815-bc61-87714dbd0431",
        "8b9bbfbc-34dc-45f4-8dee-d82a44fc9995",
        "60ecef71-0a30-4798-aae7-63f6c1df0cf0",
        "64d0431b-bb68-4045-8fff-5ae2ed4eed51",
        "2e8df74f-3536-4044-aa13-1c1b273ab29f",
    ];

    #[test]
    fn test_hint_table_routes_to_each_shard() {
        for num_shards in [1u32, 2, 5, 10, 64] {
            let strategy = ShardRoutingV1::new(num_shards, 1).unwrap();
            for (shard, hint) in strategy.shard_to_hint.iter().enumerate() {
                assert_eq!(engine_shard(hint, num_shards), shard as u32);
            }
        }
    }

    #[test]
    fn test_tenant_spread_within_possible_hints() {
        let strategy = ShardRoutingV1::new(10, 7).unwrap();
        for tenant in TENANT_IDS {
            let possible: HashSet<String> =
                strategy.possible_hints(tenant).into_iter().collect();
            assert_eq!(possible.len(), 7);

            let seen: HashSet<String> = DOC_IDS
                .iter()
                .map(|doc| strategy.routing_hint(tenant, doc))
                .collect();
            // These 13 doc ids land on 5 of the tenant's 7 shards.
            assert_eq!(seen.len(), 5);
            assert!(seen.is_subset(&possible));
        }
    }

    #[test]
    fn test_single_shard_per_tenant() {
        let strategy = ShardRoutingV1::new(5, 1).unwrap();
        for tenant in TENANT_IDS {
            let seen: HashSet<String> = DOC_IDS
                .iter()
                .map(|doc| strategy.routing_hint(tenant, doc))
                .collect();
            assert_eq!(seen.len(), 1);

            let possible = strategy.possible_hints(tenant);
            assert_eq!(possible.len(), 1);
            assert!(seen.contains(&possible[0]));
        }
    }

    #[test]
    fn test_single_shard_index() {
        let strategy = ShardRoutingV1::new(1, 1).unwrap();
        let mut seen = HashSet::new();
        for tenant in TENANT_IDS {
            for doc in DOC_IDS {
                seen.insert(strategy.routing_hint(tenant, doc));
            }
        }
        assert_eq!(seen.len(), 1);
    }

    #[test]
    fn test_tenants_spread_across_index() {
        let strategy = ShardRoutingV1::new(5, 1).unwrap();
        let seen: HashSet<String> = TENANT_IDS
            .iter()
            .map(|tenant| strategy.routing_hint(tenant, "713729b0-91d1-4006-9317-8db4bc113be4"))
            .collect();
        // 15 tenants are enough to occupy all 5 shards.
        assert_eq!(seen.len(), 5);
    }

    #[test]
    fn test_misconfiguration_rejected() {
        assert!(ShardRoutingV1::new(3, 7).is_err());
        assert!(ShardRoutingV1::new(5, 0).is_err());
    }

    #[test]
    fn test_deterministic_across_instances() {
        let a = ShardRoutingV1::new(10, 3).unwrap();
        let b = ShardRoutingV1::new(10, 3).unwrap();
        for tenant in TENANT_IDS.iter().take(3) {
            for doc in DOC_IDS.iter().take(3) {
                assert_eq!(a.routing_hint(tenant, doc), b.routing_hint(tenant, doc));
            }
            assert_eq!(a.possible_hints(tenant), b.possible_hints(tenant));
        }
    }
}
