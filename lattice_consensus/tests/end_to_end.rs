//! Whole-lattice scenarios: from signing transactions to verifying the
//! blocks that carry them.

mod common;

use common::{
    account, alice, balances, bob, child_block, genesis_block, init_logger, transfer, Crypto,
    State,
};
use lattice_consensus::{
    block_artifact::{BlockArtifact, TransactionArray},
    config::VerifierConfig,
    crypto::SignatureScheme,
    filter::{FnFilterEngine, TimeoutFilterEngine},
    transaction_artifact::{TransactionArtifact, TransactionTemplate},
    typed_actions::{Demand, Deposit, Receipt, TypedAction},
    ConsensusError, ConsensusResult,
};
use lattice_trie::{address::Address, scalar::Scalar, Digest, DigestExt};

type TestResult = Result<(), Box<dyn std::error::Error>>;

fn accept_all() -> FnFilterEngine {
    FnFilterEngine::accept_all()
}

#[test]
fn genesis_with_premined_account_verifies() -> TestResult {
    init_logger();
    let config = VerifierConfig::default();

    let credit = transfer(&[account(&alice(), 0, 10)], 0, &State::new(), &alice())?;
    let genesis = genesis_block(vec![credit])?.to_genesis(&config)?;

    assert_eq!(genesis.header().frontier, balances(&[(&alice(), 10)])?.digest());
    assert!(genesis.verify_all_for_genesis::<Crypto, _>(&accept_all()));
    Ok(())
}

#[test]
fn child_block_paying_a_fee_verifies() -> TestResult {
    init_logger();
    let config = VerifierConfig::default();

    let credit = transfer(&[account(&alice(), 0, 10)], 0, &State::new(), &alice())?;
    let genesis = genesis_block(vec![credit])?;

    let homestead = balances(&[(&alice(), 10)])?;
    let spend = transfer(&[account(&alice(), 10, 9)], 1, &homestead, &alice())?;
    let block = child_block(&genesis, vec![spend], &homestead)?.to_block(&config)?;

    assert_eq!(block.header().frontier, balances(&[(&alice(), 9)])?.digest());
    assert!(block.verify_all::<Crypto, _>(&accept_all(), &config));
    Ok(())
}

#[test]
fn child_block_minting_above_the_reward_fails() -> TestResult {
    init_logger();
    let config = VerifierConfig::default();

    let credit = transfer(&[account(&alice(), 0, 10)], 0, &State::new(), &alice())?;
    let genesis = genesis_block(vec![credit])?;
    let homestead = balances(&[(&alice(), 10)])?;

    // Alice pays the fee, and bob is credited well beyond it plus the reward.
    let inflate = transfer(
        &[account(&alice(), 10, 9), account(&bob(), 0, 1 + 2048)],
        1,
        &homestead,
        &alice(),
    )?;
    let block = child_block(&genesis, vec![inflate], &homestead)?.to_block(&config)?;

    assert!(!block.verify_balance_change());
    assert!(!block.verify_all::<Crypto, _>(&accept_all(), &config));
    Ok(())
}

#[test]
fn spends_from_a_forged_balance_are_rejected() -> TestResult {
    init_logger();
    let config = VerifierConfig::default();

    let credit = transfer(&[account(&alice(), 0, 10)], 0, &State::new(), &alice())?;
    let genesis = genesis_block(vec![credit])?;
    let homestead = balances(&[(&alice(), 10)])?;

    // Alice claims to hold 2000 while the homestead proves 10.
    let forged = transfer(&[account(&alice(), 2000, 1999)], 1, &homestead, &alice())?;
    let err = child_block(&genesis, vec![forged.clone()], &homestead).unwrap_err();
    assert!(matches!(err, ConsensusError::StaleAction { .. }));

    // The same transaction spliced into an honest block as shipped JSON.
    let spend = transfer(&[account(&alice(), 10, 9)], 1, &homestead, &alice())?;
    let honest = child_block(&genesis, vec![spend], &homestead)?;
    let mut json = serde_json::to_value(&honest)?;
    let forged_root: Address<TransactionArray<Crypto>, Crypto> =
        Address::new(TransactionArray::from_artifacts(vec![forged]));
    json["transactions_root"] = serde_json::to_value(forged_root)?;
    json["frontier"] = serde_json::to_value(balances(&[(&alice(), 1999)])?.digest())?;
    let spliced: BlockArtifact<Crypto> = serde_json::from_value(json)?;

    let err = spliced.to_block(&config).unwrap_err();
    assert!(matches!(err, ConsensusError::StaleAction { .. }));
    assert!(!err.is_recoverable());
    Ok(())
}

#[test]
fn deposits_need_a_parent_receipt() -> TestResult {
    init_logger();

    let demand = Demand {
        nonce: Digest::from(42),
        recipient: bob().signer::<Crypto>(),
        amount: Digest::from(5),
    };
    let receipt = Receipt {
        sender: alice().signer::<Crypto>(),
        demand: demand.clone(),
    };
    let parent_state = State::from_entries([(
        Receipt::key(&demand),
        Scalar::new(receipt.to_action().new),
    )])?;

    let deposit = Deposit {
        demand: demand.clone(),
        old_balance: Digest::from(5),
        new_balance: Digest::zero(),
    };
    let deposit_action = deposit.to_action();
    let homestead = State::from_entries([(
        String::from_utf8(deposit_action.key.clone())?,
        Scalar::new(deposit_action.old.clone()),
    )])?;
    let actions = vec![deposit_action, account(&bob(), 0, 5).to_action()];

    let claim = |receipts: Option<Vec<Receipt>>| -> ConsensusResult<bool> {
        let mut template =
            TransactionTemplate::new(actions.clone(), Digest::zero(), None, homestead.clone());
        if let Some(receipts) = receipts {
            template = template.with_parent(parent_state.clone(), receipts);
        }
        let transaction = TransactionArtifact::<Crypto>::signed(&template, &[alice()])?
            .convert_to_transaction()?;

        Ok(transaction.verify_all::<Crypto, _>(&[], &accept_all()))
    };

    assert!(!claim(None)?);
    assert!(!claim(Some(vec![]))?);
    assert!(claim(Some(vec![receipt]))?);
    Ok(())
}

#[test]
fn tampered_signatures_fail() -> TestResult {
    init_logger();
    let homestead = balances(&[(&alice(), 10)])?;
    let template = TransactionTemplate::new(
        vec![account(&alice(), 10, 9).to_action()],
        Digest::one(),
        None,
        homestead,
    );

    let unsigned = TransactionArtifact::<Crypto>::unsigned(&template, vec![alice().public_key])?;
    let message = unsigned.transaction_hash().to_digest_bytes();
    let signature = Crypto::sign(&message, &alice().private_key).ok_or("alice can't sign")?;

    let honest = unsigned
        .clone()
        .with_signatures(vec![signature.clone()])
        .convert_to_transaction()?;
    assert!(honest.verify_all::<Crypto, _>(&[], &accept_all()));

    let mut tampered = signature;
    tampered[0] ^= 1;
    let forged = unsigned
        .with_signatures(vec![tampered])
        .convert_to_transaction()?;
    assert_eq!(forged.transaction_hash(), honest.transaction_hash());
    assert!(!forged.verify_signatures::<Crypto>());
    assert!(!forged.verify_all::<Crypto, _>(&[], &accept_all()));
    Ok(())
}

#[test]
fn filters_run_against_every_transaction() -> TestResult {
    init_logger();
    let homestead = balances(&[(&alice(), 10)])?;
    let transaction = transfer(&[account(&alice(), 10, 9)], 1, &homestead, &alice())?
        .convert_to_transaction()?;
    let filters = vec!["fee-at-most-one".to_string()];

    let engine = TimeoutFilterEngine::new(
        FnFilterEngine::new(|_, transaction: &[u8]| {
            let value: serde_json::Value = serde_json::from_slice(transaction)
                .map_err(|e| lattice_consensus::filter::FilterError::Evaluation(e.to_string()))?;
            Ok(value["fee"] == "0x1")
        }),
        VerifierConfig::default().filter_timeout,
    );

    assert!(transaction.verify_all::<Crypto, _>(&filters, &engine));
    Ok(())
}
