//! Claim extraction through the configured mapping table

use varco_core::{ClaimMappings, ClaimSet, ProfileFields};

/// The attributes the reconciler works with, already resolved through
/// the provider-defined claim names.
#[derive(Debug, Clone, Default)]
pub struct MappedClaims {
    pub external_id: Option<String>,
    pub email: Option<String>,
    pub username: Option<String>,
    pub profile: ProfileFields,
}

pub fn map_claims(claims: &ClaimSet, mappings: &ClaimMappings) -> MappedClaims {
    let get = |name: &str| claims.get_str(name).map(str::to_string);

    MappedClaims {
        external_id: get(&mappings.user_id),
        email: get(&mappings.email),
        username: get(&mappings.username),
        profile: ProfileFields {
            email: get(&mappings.email),
            given_name: get(&mappings.given_name),
            family_name: get(&mappings.family_name),
            fiscal_code: get(&mappings.fiscal_code),
            mobile_phone: get(&mappings.mobile_phone),
        },
    }
}
