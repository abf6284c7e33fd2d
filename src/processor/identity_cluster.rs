use serde::Serialize;

/// A `(name, email, phone, address)` tuple used only for comparison.
/// Missing values are stored as empty strings.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub struct IdentityProfile {
    fields: [String; 4],
}

impl IdentityProfile {
    pub fn new(
        name: Option<&str>,
        email: Option<&str>,
        phone: Option<&str>,
        address: Option<&str>,
    ) -> Self {
        let field = |v: Option<&str>| v.unwrap_or_default().to_string();
        IdentityProfile {
            fields: [field(name), field(email), field(phone), field(address)],
        }
    }

    pub fn fields(&self) -> &[String; 4] {
        &self.fields
    }

    /// Number of positions whose values differ.
    pub fn differing_fields(&self, other: &IdentityProfile) -> usize {
        self.fields
            .iter()
            .zip(other.fields.iter())
            .filter(|(a, b)| a != b)
            .count()
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct IdentityCluster<P> {
    representative: IdentityProfile,
    members: Vec<P>,
}

impl<P> IdentityCluster<P> {
    /// The profile that founded the cluster.
    pub fn representative(&self) -> &IdentityProfile {
        &self.representative
    }

    pub fn members(&self) -> &[P] {
        &self.members
    }
}

/// Single-pass, representative-anchored clustering of identity profiles.
///
/// Each profile joins the first cluster, in creation order, whose
/// representative differs from it in at most `max_differences` fields;
/// otherwise it founds a new cluster and becomes its representative.
///
/// Membership is checked against the representative only, never against
/// other members, so the relation is not transitive: with A = (x, y, z, w),
/// B = (x, y, z, q) and C = (x, y, r, q), B joins A's cluster but C (two
/// fields away from A) starts its own even though it is one field from B.
/// The outcome therefore depends on input order, and the clusters are not
/// a globally optimal partition.
#[derive(Debug, Clone)]
pub struct IdentityClusterer<P> {
    max_differences: usize,
    clusters: Vec<IdentityCluster<P>>,
}

impl<P> IdentityClusterer<P> {
    pub fn new() -> Self {
        Self::with_max_differences(1)
    }

    pub fn with_max_differences(max_differences: usize) -> Self {
        IdentityClusterer {
            max_differences,
            clusters: Vec::new(),
        }
    }

    /// Assign a profile, returning the index of the cluster it landed in.
    pub fn insert(&mut self, profile: IdentityProfile, payload: P) -> usize {
        let matched = self
            .clusters
            .iter()
            .position(|c| c.representative.differing_fields(&profile) <= self.max_differences);

        match matched {
            Some(idx) => {
                self.clusters[idx].members.push(payload);
                idx
            }
            None => {
                self.clusters.push(IdentityCluster {
                    representative: profile,
                    members: vec![payload],
                });
                self.clusters.len() - 1
            }
        }
    }

    pub fn len(&self) -> usize {
        self.clusters.len()
    }

    pub fn is_empty(&self) -> bool {
        self.clusters.is_empty()
    }

    pub fn clusters(&self) -> &[IdentityCluster<P>] {
        &self.clusters
    }

    pub fn into_clusters(self) -> Vec<IdentityCluster<P>> {
        self.clusters
    }
}

impl<P> Default for IdentityClusterer<P> {
    fn default() -> Self {
        Self::new()
    }
}

/// Count clusters over profiles fed in order.
pub fn count_identity_clusters<'a>(profiles: impl IntoIterator<Item = &'a IdentityProfile>) -> usize {
    let mut clusterer = IdentityClusterer::new();
    for profile in profiles {
        clusterer.insert(profile.clone(), ());
    }
    clusterer.len()
}
