use tracing::info;

use crate::claim::codec::{Claim, ClaimFields};
use crate::claim::schema::SchemaHash;
use crate::core::identity::state::{IdentityTrees, TreeState};
use crate::crypto::signature::PublicKey;
use crate::types::error::{IdentityError, Result};
use crate::types::identifier::{IdType, Identifier};

/// Auth claim binding `public_key` to an identity.
///
/// The key halves go into the two index-data slots, so the claim's position
/// in the claims tree is determined by the key itself.
pub fn auth_claim(public_key: &PublicKey, revocation_nonce: u64) -> Result<Claim> {
    let (low, high) = public_key.to_claim_slots()?;
    Claim::encode(
        &ClaimFields::new(SchemaHash::AUTH)
            .with_index_data(low, high)
            .with_revocation_nonce(revocation_nonce),
    )
}

/// Public key carried by an auth claim.
pub fn auth_claim_public_key(claim: &Claim) -> Result<PublicKey> {
    let fields = claim.decode_as(&SchemaHash::AUTH)?;
    PublicKey::from_claim_slots(&fields.index_data[0], &fields.index_data[1])
}

/// Genesis state of an identity whose claims tree holds only `auth_claim`.
///
/// Pure: the same auth claim and type always give the same identifier and state.
pub fn genesis_state(auth_claim: &Claim, id_type: IdType) -> Result<(Identifier, TreeState)> {
    let trees = genesis_trees(auth_claim)?;
    let state = trees.tree_state()?;
    Ok((Identifier::from_genesis_state(id_type, &state.state), state))
}

fn genesis_trees(auth_claim: &Claim) -> Result<IdentityTrees> {
    if auth_claim.schema_hash() != SchemaHash::AUTH {
        return Err(IdentityError::SchemaMismatch {
            expected: SchemaHash::AUTH.to_hex(),
            found: auth_claim.schema_hash().to_hex(),
        });
    }
    let mut trees = IdentityTrees::default();
    trees.insert_claim(auth_claim)?;
    Ok(trees)
}

/// True when `state` is the genesis state of `id`.
pub fn is_genesis_state(id: &Identifier, state: &TreeState) -> bool {
    state.is_consistent() && id.is_genesis_state(&state.state)
}

/// An identity: its identifier, auth claim, genesis state and live trees
#[derive(Clone, Debug)]
pub struct Identity {
    id: Identifier,
    auth_claim: Claim,
    genesis: TreeState,
    trees: IdentityTrees,
}

impl Identity {
    pub fn genesis(auth_claim: Claim, id_type: IdType) -> Result<Self> {
        let trees = genesis_trees(&auth_claim)?;
        let genesis = trees.tree_state()?;
        let id = Identifier::from_genesis_state(id_type, &genesis.state);
        info!(%id, state = %genesis.state, "created genesis identity");
        Ok(Identity {
            id,
            auth_claim,
            genesis,
            trees,
        })
    }

    /// Identity with a fresh auth claim for `public_key`.
    pub fn from_public_key(public_key: &PublicKey, revocation_nonce: u64) -> Result<Self> {
        Self::genesis(auth_claim(public_key, revocation_nonce)?, IdType::DEFAULT)
    }

    pub fn id(&self) -> Identifier {
        self.id
    }

    pub fn auth_claim(&self) -> &Claim {
        &self.auth_claim
    }

    pub fn genesis_state(&self) -> TreeState {
        self.genesis
    }

    pub fn trees(&self) -> &IdentityTrees {
        &self.trees
    }

    pub fn tree_state(&self) -> Result<TreeState> {
        self.trees.tree_state()
    }

    pub fn is_at_genesis(&self) -> Result<bool> {
        Ok(self.tree_state()? == self.genesis)
    }

    /// Replace the live trees with committed ones.
    pub(crate) fn commit(&mut self, trees: IdentityTrees) {
        self.trees = trees;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::identity::state::TreeUpdate;
    use crate::crypto::signature::{FieldSigner, KeyPair};
    use crate::types::field::FieldElement;

    #[test]
    fn test_genesis_is_deterministic() -> Result<()> {
        let key = KeyPair::from_entropy(b"genesis");
        let claim = auth_claim(&key.public_key(), 1)?;
        let (id_a, state_a) = genesis_state(&claim, IdType::DEFAULT)?;
        let (id_b, state_b) = genesis_state(&claim, IdType::DEFAULT)?;
        assert_eq!(id_a, id_b);
        assert_eq!(state_a, state_b);
        assert!(is_genesis_state(&id_a, &state_a));

        let other = auth_claim(&key.public_key(), 2)?;
        let (id_c, _) = genesis_state(&other, IdType::DEFAULT)?;
        assert_ne!(id_a, id_c);
        Ok(())
    }

    #[test]
    fn test_genesis_requires_auth_schema() -> Result<()> {
        let claim = Claim::encode(&ClaimFields::new(SchemaHash::KYC_AGE))?;
        assert!(matches!(
            genesis_state(&claim, IdType::DEFAULT),
            Err(IdentityError::SchemaMismatch { .. })
        ));
        Ok(())
    }

    #[test]
    fn test_auth_claim_carries_key() -> Result<()> {
        let key = KeyPair::from_entropy(b"auth");
        let claim = auth_claim(&key.public_key(), 9)?;
        assert_eq!(auth_claim_public_key(&claim)?, key.public_key());
        assert_eq!(claim.revocation_nonce(), 9);
        Ok(())
    }

    #[test]
    fn test_identity_leaves_genesis() -> Result<()> {
        let key = KeyPair::from_entropy(b"identity");
        let mut identity = Identity::from_public_key(&key.public_key(), 1)?;
        assert!(identity.is_at_genesis()?);
        assert!(is_genesis_state(&identity.id(), &identity.tree_state()?));

        let claim = Claim::encode(
            &ClaimFields::new(SchemaHash::KYC_AGE)
                .with_index_data(FieldElement::from_u64(1), FieldElement::ZERO),
        )?;
        let pending = identity.trees().apply(&TreeUpdate::add_claim(claim))?;
        identity.commit(pending.trees);
        assert!(!identity.is_at_genesis()?);
        assert!(!identity.id().is_genesis_state(&identity.tree_state()?.state));
        Ok(())
    }
}
