//! Region resolution tables.
//!
//! Pure data, no I/O and no error conditions. Each provider has its own
//! location-identifier table and its own sparse-coverage fallback table;
//! the two deliberately disagree, because the providers' checkpoint fleets
//! do. A region flagged sparse for a provider gets exactly one
//! predetermined neighbor appended to the submitted region list.

use crate::db::enums::Region;
use crate::providers::{PROVIDER_SITE24X7, PROVIDER_UPTRENDS};

/// Uptrends checkpoint server ids per region. Regions with fewer than
/// [`MIN_CHECKPOINTS`] entries are listed in [`UPTRENDS_FALLBACKS`].
const UPTRENDS_CHECKPOINTS: &[(Region, &[u32])] = &[
    (Region::Us, &[13, 28, 54, 61]),
    (Region::Gb, &[21, 22, 96]),
    (Region::De, &[31, 33, 87]),
    (Region::Fr, &[41, 44, 109]),
    (Region::Sg, &[66, 68, 71]),
    (Region::Th, &[77]),
    (Region::Jp, &[46, 49, 118]),
    (Region::Au, &[72, 75, 121]),
    (Region::In, &[39, 40]),
    (Region::Br, &[88, 92]),
];

/// Site24x7 location profile ids per region.
const SITE24X7_LOCATIONS: &[(Region, &str)] = &[
    (Region::Us, "na.us.east"),
    (Region::Gb, "eu.gb.london"),
    (Region::De, "eu.de.frankfurt"),
    (Region::Fr, "eu.fr.paris"),
    (Region::Sg, "ap.sg.singapore"),
    (Region::Th, "ap.th.bangkok"),
    (Region::Jp, "ap.jp.tokyo"),
    (Region::Au, "ap.au.sydney"),
    (Region::In, "ap.in.mumbai"),
    (Region::Br, "sa.br.saopaulo"),
];

/// Minimum checkpoint count below which Uptrends coverage counts as sparse.
const MIN_CHECKPOINTS: usize = 3;

/// Uptrends regions with sparse checkpoint coverage and the neighbor that
/// backs each one up. The neighbor is a fixed policy choice, not computed.
const UPTRENDS_FALLBACKS: &[(Region, Region)] = &[
    (Region::Th, Region::Sg),
    (Region::In, Region::Sg),
    (Region::Br, Region::Us),
];

/// Site24x7's sparse set differs from Uptrends': its Bangkok and Sydney
/// profiles are single-node, Mumbai and São Paulo are not.
const SITE24X7_FALLBACKS: &[(Region, Region)] = &[
    (Region::Th, Region::Jp),
    (Region::Au, Region::Sg),
];

pub fn uptrends_checkpoints(region: Region) -> &'static [u32] {
    lookup(UPTRENDS_CHECKPOINTS, region).unwrap_or_else(|| {
        // The table covers the closed region set; this arm only fires if a
        // region is added without a checkpoint entry. Fail open to the
        // default region's checkpoints.
        lookup(UPTRENDS_CHECKPOINTS, crate::db::enums::DEFAULT_REGION).unwrap_or(&[])
    })
}

pub fn site24x7_location(region: Region) -> &'static str {
    lookup(SITE24X7_LOCATIONS, region).unwrap_or("na.us.east")
}

/// The region list actually submitted to a provider for a logical region:
/// the primary, plus that provider's predetermined neighbor when the
/// primary's coverage is sparse. Unknown provider names get no fallback.
pub fn submission_regions(provider: &str, region: Region) -> Vec<Region> {
    let fallbacks = match provider {
        PROVIDER_UPTRENDS => UPTRENDS_FALLBACKS,
        PROVIDER_SITE24X7 => SITE24X7_FALLBACKS,
        _ => &[],
    };
    let mut regions = vec![region];
    if let Some(neighbor) = lookup(fallbacks, region) {
        regions.push(neighbor);
    }
    regions
}

fn lookup<T: Copy>(table: &'static [(Region, T)], region: Region) -> Option<T> {
    table
        .iter()
        .find(|(r, _)| *r == region)
        .map(|(_, value)| *value)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::enums::DEFAULT_REGION;

    #[test]
    fn every_region_has_both_provider_entries() {
        for region in Region::ALL {
            assert!(!uptrends_checkpoints(region).is_empty());
            assert!(!site24x7_location(region).is_empty());
        }
    }

    #[test]
    fn sparse_tables_only_flag_regions_below_the_minimum() {
        for (region, _) in UPTRENDS_FALLBACKS {
            assert!(uptrends_checkpoints(*region).len() < MIN_CHECKPOINTS);
        }
    }

    #[test]
    fn resolution_is_deterministic() {
        let first = submission_regions(PROVIDER_UPTRENDS, Region::Th);
        for _ in 0..10 {
            assert_eq!(submission_regions(PROVIDER_UPTRENDS, Region::Th), first);
        }
    }

    #[test]
    fn thailand_falls_back_per_provider() {
        assert_eq!(
            submission_regions(PROVIDER_UPTRENDS, Region::Th),
            vec![Region::Th, Region::Sg]
        );
        assert_eq!(
            submission_regions(PROVIDER_SITE24X7, Region::Th),
            vec![Region::Th, Region::Jp]
        );
    }

    #[test]
    fn well_covered_regions_get_no_fallback() {
        assert_eq!(
            submission_regions(PROVIDER_UPTRENDS, Region::Us),
            vec![Region::Us]
        );
        assert_eq!(
            submission_regions(PROVIDER_SITE24X7, Region::In),
            vec![Region::In]
        );
    }

    #[test]
    fn unknown_codes_resolve_through_the_default_region() {
        let region = Region::parse_lossy("ZZ");
        assert_eq!(region, DEFAULT_REGION);
        assert_eq!(
            submission_regions(PROVIDER_UPTRENDS, region),
            vec![DEFAULT_REGION]
        );
    }
}
