//! Zero-knowledge proofs sent by the customer during establish and pay.
//!
//! Both proofs speak about wallet states laid out as
//! `[channel_id, nonce, revocation_lock, customer_balance, merchant_balance]`; the close state
//! puts the close tag in the nonce position. A proof is a conjunction of Schnorr proofs under a
//! single Fiat-Shamir challenge. Positions that must hold equal values use one commitment scalar
//! across the conjunction, so the verifier only compares response scalars. Positions that must
//! equal a public value `v` are checked as `response == c * v + s`, with `s` sent in the clear.
//!
//! The merchant learns the public values and nothing else: not the balances, and for pay not
//! which earlier wallet is being spent.

use crate::{
    customer, merchant, revlock::*, states::*, types::*, Error, Nonce, PaymentAmount, Rng,
    Verification,
};
use bolt_crypto::{
    pointcheval_sanders::{BlindedMessage, PublicKey},
    proofs::{
        Challenge, ChallengeBuilder, ChallengeInput, CommitmentProof, CommitmentProofBuilder,
        RangeConstraint, RangeConstraintBuilder, RangeConstraintParameters, SignatureProof,
        SignatureProofBuilder,
    },
    SerializeElement,
};
use serde::{Deserialize, Serialize};

// Positions in a state message.
const CHANNEL_ID: usize = 0;
const NONCE: usize = 1;
const REVOCATION_LOCK: usize = 2;
const CUSTOMER_BALANCE: usize = 3;
const MERCHANT_BALANCE: usize = 4;

/// Scalars to fix when proving the close state that matches a state with nonces `state`: every
/// position is shared except the nonce, which the close tag replaces.
fn close_state_link(state: &[Scalar; STATE_LEN]) -> [Option<Scalar>; STATE_LEN] {
    let mut linked = [None; STATE_LEN];
    for (i, s) in state.iter().enumerate() {
        if i != NONCE {
            linked[i] = Some(*s);
        }
    }
    linked
}

/// Whether two response vectors agree at every position but the nonce.
fn close_state_linked(state: &[Scalar; STATE_LEN], close_state: &[Scalar; STATE_LEN]) -> bool {
    (0..STATE_LEN)
        .filter(|i| *i != NONCE)
        .all(|i| state[i] == close_state[i])
}

/// `response == c * value + commitment_scalar`
fn reveals(
    response: Scalar,
    challenge: Challenge,
    value: Scalar,
    commitment_scalar: Scalar,
) -> bool {
    response == challenge.to_scalar() * value + commitment_scalar
}

/// Commitments to an initial wallet and to its close state, sent with an [`EstablishProof`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct WalletCommitment {
    /// Commitment to the state; the merchant signs it to produce the pay token.
    pub state_commitment: StateCommitment,
    /// Commitment to the close state; the merchant signs it to produce the close token.
    pub close_state_commitment: CloseStateCommitment,
}

/// Proof that a committed initial wallet is the one both parties agreed on.
///
/// It shows that the state and close state commitments carry the agreed channel id and balances,
/// share one revocation lock, and that the close state carries the close tag. The wallet nonce
/// and revocation lock stay hidden.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EstablishProof {
    /// Commitment scalars for the positions checked against public values. The revocation lock
    /// slot is zero.
    #[serde(with = "SerializeElement")]
    public_scalars: [Scalar; STATE_LEN],
    state_proof: CommitmentProof<G1Projective, STATE_LEN>,
    close_state_proof: CommitmentProof<G1Projective, STATE_LEN>,
}

/// What the merchant expects an [`EstablishProof`] to show.
#[derive(Debug, Clone, Copy)]
pub struct EstablishProofPublicValues {
    /// Expected channel ID.
    pub channel_id: ChannelId,
    /// Expected merchant balance.
    pub merchant_balance: MerchantBalance,
    /// Expected customer balance.
    pub customer_balance: CustomerBalance,
}

fn establish_challenge(
    public_key: &PublicKey<STATE_LEN>,
    public_values: &EstablishProofPublicValues,
    state_proof: &impl ChallengeInput,
    close_state_proof: &impl ChallengeInput,
) -> Challenge {
    ChallengeBuilder::new()
        .with_bytes(b"bolt establish")
        .with(public_key)
        .with(&public_values.channel_id.to_scalar())
        .with(&close_tag())
        .with(&public_values.customer_balance.to_scalar())
        .with(&public_values.merchant_balance.to_scalar())
        .with(state_proof)
        .with(close_state_proof)
        .finish()
}

impl EstablishProof {
    /// Commit to `state` and its close state and prove them well formed.
    ///
    /// Returns the blinding factors the customer needs to unblind the two tokens.
    pub(crate) fn new(
        rng: &mut impl Rng,
        params: &customer::Config,
        state: &State,
    ) -> (Self, CloseStateBlindingFactor, PayTokenBlindingFactor) {
        let commitment_params = params.merchant_public_key.to_g1_pedersen_parameters();

        let state_builder = CommitmentProofBuilder::generate_proof_commitments(
            rng,
            state.to_message(),
            &[None; STATE_LEN],
            &commitment_params,
        );
        let close_state_builder = CommitmentProofBuilder::generate_proof_commitments(
            rng,
            state.close_state().to_message(),
            &close_state_link(state_builder.conjunction_commitment_scalars()),
            &commitment_params,
        );

        let challenge = establish_challenge(
            &params.merchant_public_key,
            &EstablishProofPublicValues {
                channel_id: state.channel_id(),
                merchant_balance: state.merchant_balance(),
                customer_balance: state.customer_balance(),
            },
            &state_builder,
            &close_state_builder,
        );

        // The close-state scalars hold the close tag's slot; the lock's slot must not leave the
        // customer.
        let mut public_scalars = *close_state_builder.conjunction_commitment_scalars();
        public_scalars[REVOCATION_LOCK] = Scalar::zero();
        let pay_token_bf = PayTokenBlindingFactor(state_builder.message_blinding_factor());
        let close_state_bf =
            CloseStateBlindingFactor(close_state_builder.message_blinding_factor());

        let proof = Self {
            public_scalars,
            state_proof: state_builder.generate_proof_response(challenge),
            close_state_proof: close_state_builder.generate_proof_response(challenge),
        };
        (proof, close_state_bf, pay_token_bf)
    }

    /// The commitments this proof is about.
    pub fn wallet_commitment(&self) -> WalletCommitment {
        WalletCommitment {
            state_commitment: StateCommitment(BlindedMessage(self.state_proof.commitment())),
            close_state_commitment: CloseStateCommitment(BlindedMessage(
                self.close_state_proof.commitment(),
            )),
        }
    }

    /// Check the proof against the merchant's key and the agreed initial values.
    pub fn verify(
        &self,
        params: &merchant::Config,
        public_values: &EstablishProofPublicValues,
    ) -> Verification {
        let public_key = params.signing_keypair.public_key();
        let challenge = establish_challenge(
            public_key,
            public_values,
            &self.state_proof,
            &self.close_state_proof,
        );
        let commitment_params = public_key.to_g1_pedersen_parameters();
        if !self
            .state_proof
            .verify_knowledge_of_opening(&commitment_params, challenge)
            || !self
                .close_state_proof
                .verify_knowledge_of_opening(&commitment_params, challenge)
        {
            return Verification::Failed;
        }

        let state = self.state_proof.conjunction_response_scalars();
        let close_state = self.close_state_proof.conjunction_response_scalars();
        let expected = [
            (CHANNEL_ID, public_values.channel_id.to_scalar()),
            (CUSTOMER_BALANCE, public_values.customer_balance.to_scalar()),
            (MERCHANT_BALANCE, public_values.merchant_balance.to_scalar()),
        ];
        let public_positions_match = expected
            .iter()
            .all(|&(i, value)| reveals(state[i], challenge, value, self.public_scalars[i]));

        Verification::from(
            public_positions_match
                && close_state_linked(state, close_state)
                && reveals(close_state[NONCE], challenge, close_tag(), self.public_scalars[NONCE]),
        )
    }
}

/// Proof that a new wallet is a valid update of a signed one.
///
/// The customer shows that:
/// - they hold a pay token on some earlier state, whose nonce is the one revealed;
/// - the committed revocation lock is the one in that earlier state;
/// - the new state keeps the channel id and moves exactly the public amount between balances;
/// - the new close state matches the new state and carries the close tag;
/// - both new balances lie in `[0, 2^63)`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PayProof {
    #[serde(with = "SerializeElement")]
    nonce_commitment_scalar: Scalar,
    #[serde(with = "SerializeElement")]
    close_tag_commitment_scalar: Scalar,

    pay_token_proof: SignatureProof<STATE_LEN>,
    revocation_lock_proof: CommitmentProof<G1Projective, 1>,
    state_proof: CommitmentProof<G1Projective, STATE_LEN>,
    close_state_proof: CommitmentProof<G1Projective, STATE_LEN>,
    customer_balance_proof: RangeConstraint,
    merchant_balance_proof: RangeConstraint,
}

/// What the merchant expects a [`PayProof`] to show.
#[derive(Debug, Clone, Copy)]
pub struct PayProofPublicValues {
    /// Nonce of the wallet being spent, revealed at the beginning of Pay.
    pub nonce: Nonce,
    /// Total amount moved from the customer to the merchant.
    pub amount: PaymentAmount,
}

/// Openings the customer keeps after sending a [`PayProof`].
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub(crate) struct BlindingFactors {
    /// Opens the commitment to the spent wallet's revocation lock.
    pub for_revocation_lock: RevocationLockBlindingFactor,
    /// Unblinds the pay token on the new state.
    pub for_pay_token: PayTokenBlindingFactor,
    /// Unblinds the close token on the new close state.
    pub for_close_state: CloseStateBlindingFactor,
}

/// Everything absorbed into a pay challenge, in order.
struct PayTranscript<'a, A, B, C, D, E, F> {
    public_key: &'a PublicKey<STATE_LEN>,
    range_params: &'a RangeConstraintParameters,
    public_values: &'a PayProofPublicValues,
    revocation_lock: &'a A,
    state: &'a B,
    close_state: &'a C,
    pay_token: &'a D,
    customer_balance: &'a E,
    merchant_balance: &'a F,
}

impl<A, B, C, D, E, F> PayTranscript<'_, A, B, C, D, E, F>
where
    A: ChallengeInput,
    B: ChallengeInput,
    C: ChallengeInput,
    D: ChallengeInput,
    E: ChallengeInput,
    F: ChallengeInput,
{
    fn challenge(&self) -> Challenge {
        ChallengeBuilder::new()
            .with_bytes(b"bolt pay")
            .with(self.public_key)
            .with(self.range_params.public_key())
            .with(&self.public_values.nonce.to_scalar())
            .with(&self.public_values.amount.to_scalar())
            .with(&close_tag())
            .with(self.revocation_lock)
            .with(self.state)
            .with(self.close_state)
            .with(self.pay_token)
            .with(self.customer_balance)
            .with(self.merchant_balance)
            .finish()
    }
}

impl PayProof {
    /// Prove that `state` is `old_state` after paying `amount`, where `pay_token` signs
    /// `old_state`.
    ///
    /// Fails with [`Error::InvalidAmount`] if a new balance cannot be range-constrained.
    pub(crate) fn new(
        rng: &mut impl Rng,
        params: &customer::Config,
        pay_token: PayToken,
        old_state: &State,
        state: &State,
        amount: PaymentAmount,
    ) -> Result<(Self, BlindingFactors), Error> {
        let commitment_params = params.merchant_public_key.to_g1_pedersen_parameters();
        let mut constrain = |balance: u64| {
            RangeConstraintBuilder::generate_constraint_commitments(
                balance,
                &params.range_constraint_parameters,
                &mut *rng,
            )
            .map_err(|_| Error::InvalidAmount(balance))
        };
        let customer_range = constrain(state.customer_balance().into_inner())?;
        let merchant_range = constrain(state.merchant_balance().into_inner())?;
        let customer_scalar = customer_range.commitment_scalar();
        let merchant_scalar = merchant_range.commitment_scalar();

        let revocation_lock_builder = CommitmentProofBuilder::generate_proof_commitments(
            rng,
            old_state.revocation_lock().to_message(),
            &[None],
            &params.revocation_commitment_parameters,
        );

        // Old and new balances share commitment scalars, so their responses differ by exactly
        // `c * amount`.
        let mut old_link = [None; STATE_LEN];
        old_link[REVOCATION_LOCK] =
            Some(revocation_lock_builder.conjunction_commitment_scalars()[0]);
        old_link[CUSTOMER_BALANCE] = Some(customer_scalar);
        old_link[MERCHANT_BALANCE] = Some(merchant_scalar);
        let pay_token_builder = SignatureProofBuilder::generate_proof_commitments(
            rng,
            old_state.to_message(),
            pay_token.0,
            &old_link,
            &params.merchant_public_key,
        );

        let mut new_link = [None; STATE_LEN];
        new_link[CHANNEL_ID] = Some(pay_token_builder.conjunction_commitment_scalars()[CHANNEL_ID]);
        new_link[CUSTOMER_BALANCE] = Some(customer_scalar);
        new_link[MERCHANT_BALANCE] = Some(merchant_scalar);
        let state_builder = CommitmentProofBuilder::generate_proof_commitments(
            rng,
            state.to_message(),
            &new_link,
            &commitment_params,
        );
        let close_state_builder = CommitmentProofBuilder::generate_proof_commitments(
            rng,
            state.close_state().to_message(),
            &close_state_link(state_builder.conjunction_commitment_scalars()),
            &commitment_params,
        );

        let public_values = PayProofPublicValues {
            nonce: old_state.nonce(),
            amount,
        };
        let challenge = PayTranscript {
            public_key: &params.merchant_public_key,
            range_params: &params.range_constraint_parameters,
            public_values: &public_values,
            revocation_lock: &revocation_lock_builder,
            state: &state_builder,
            close_state: &close_state_builder,
            pay_token: &pay_token_builder,
            customer_balance: &customer_range,
            merchant_balance: &merchant_range,
        }
        .challenge();

        let blinding_factors = BlindingFactors {
            for_revocation_lock: RevocationLockBlindingFactor(
                revocation_lock_builder.message_blinding_factor(),
            ),
            for_pay_token: PayTokenBlindingFactor(state_builder.message_blinding_factor()),
            for_close_state: CloseStateBlindingFactor(
                close_state_builder.message_blinding_factor(),
            ),
        };
        let nonce_commitment_scalar = pay_token_builder.conjunction_commitment_scalars()[NONCE];
        let close_tag_commitment_scalar =
            close_state_builder.conjunction_commitment_scalars()[NONCE];

        let proof = Self {
            nonce_commitment_scalar,
            close_tag_commitment_scalar,
            pay_token_proof: pay_token_builder.generate_proof_response(challenge),
            revocation_lock_proof: revocation_lock_builder.generate_proof_response(challenge),
            state_proof: state_builder.generate_proof_response(challenge),
            close_state_proof: close_state_builder.generate_proof_response(challenge),
            customer_balance_proof: customer_range.generate_constraint_response(challenge),
            merchant_balance_proof: merchant_range.generate_constraint_response(challenge),
        };
        Ok((proof, blinding_factors))
    }

    /// Commitment to the spent wallet's revocation lock.
    pub fn revocation_lock_commitment(&self) -> RevocationLockCommitment {
        RevocationLockCommitment(self.revocation_lock_proof.commitment())
    }

    /// Commitment to the new state, to be signed as the next pay token.
    pub fn state_commitment(&self) -> StateCommitment {
        StateCommitment(BlindedMessage(self.state_proof.commitment()))
    }

    /// Commitment to the new close state, to be signed as the next close token.
    pub fn close_state_commitment(&self) -> CloseStateCommitment {
        CloseStateCommitment(BlindedMessage(self.close_state_proof.commitment()))
    }

    /// Check the proof against the merchant's keys, the revealed nonce and the amount.
    pub fn verify(
        &self,
        params: &merchant::Config,
        public_values: &PayProofPublicValues,
    ) -> Verification {
        let public_key = params.signing_keypair.public_key();
        let range_params = &params.range_constraint_parameters;
        let challenge = PayTranscript {
            public_key,
            range_params,
            public_values,
            revocation_lock: &self.revocation_lock_proof,
            state: &self.state_proof,
            close_state: &self.close_state_proof,
            pay_token: &self.pay_token_proof,
            customer_balance: &self.customer_balance_proof,
            merchant_balance: &self.merchant_balance_proof,
        }
        .challenge();

        let commitment_params = public_key.to_g1_pedersen_parameters();
        let components_verify = self
            .pay_token_proof
            .verify_knowledge_of_signature(public_key, challenge)
            && self
                .revocation_lock_proof
                .verify_knowledge_of_opening(&params.revocation_commitment_parameters, challenge)
            && self
                .state_proof
                .verify_knowledge_of_opening(&commitment_params, challenge)
            && self
                .close_state_proof
                .verify_knowledge_of_opening(&commitment_params, challenge);
        if !components_verify {
            return Verification::Failed;
        }

        let old = self.pay_token_proof.conjunction_response_scalars();
        let new = self.state_proof.conjunction_response_scalars();
        let close = self.close_state_proof.conjunction_response_scalars();
        let revocation_lock = self.revocation_lock_proof.conjunction_response_scalars()[0];
        let shift = challenge.to_scalar() * public_values.amount.to_scalar();

        let balances_in_range = self.customer_balance_proof.verify_range_constraint(
            range_params,
            challenge,
            new[CUSTOMER_BALANCE],
        ) && self.merchant_balance_proof.verify_range_constraint(
            range_params,
            challenge,
            new[MERCHANT_BALANCE],
        );
        let old_state_matches = reveals(
            old[NONCE],
            challenge,
            public_values.nonce.to_scalar(),
            self.nonce_commitment_scalar,
        ) && old[REVOCATION_LOCK] == revocation_lock;
        let update_is_correct = new[CHANNEL_ID] == old[CHANNEL_ID]
            && new[CUSTOMER_BALANCE] == old[CUSTOMER_BALANCE] - shift
            && new[MERCHANT_BALANCE] == old[MERCHANT_BALANCE] + shift;
        let close_state_matches = close_state_linked(new, close)
            && reveals(
                close[NONCE],
                challenge,
                close_tag(),
                self.close_tag_commitment_scalar,
            );

        Verification::from(
            balances_in_range && old_state_matches && update_is_correct && close_state_matches,
        )
    }
}

/// Everything the customer sends to request a payment: the nonce of the wallet being spent, the
/// requested amount, and the proof. No balance is included.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PaymentProof {
    /// Nonce of the wallet being spent.
    pub nonce: Nonce,
    /// Amount requested, before the channel fee.
    pub amount: PaymentAmount,
    /// Proof that the new wallet is a correct update of a signed one.
    pub proof: PayProof,
}

/// Revocation of the wallet spent in a payment.
///
/// Revealing the secret lets the merchant dispute any later close on that wallet.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RevokeToken {
    /// Nonce of the payment this token completes.
    pub nonce: Nonce,
    /// Lock of the revoked wallet.
    pub revocation_lock: RevocationLock,
    /// Secret opening the lock.
    pub revocation_secret: RevocationSecret,
    /// Opening of the lock commitment sent in the payment proof.
    pub revocation_lock_blinding_factor: RevocationLockBlindingFactor,
}
