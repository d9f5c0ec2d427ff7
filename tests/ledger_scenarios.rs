//! End-to-end scenarios against the public ledger API

use edu_ledger::ledger::crypto::KeyPair;
use edu_ledger::ledger::transaction::TransactionError;
use edu_ledger::{Address, Ledger, LedgerConfig, LedgerError, MiningOutcome, Transaction, Wallet};

fn fast_ledger() -> Result<Ledger, Box<dyn std::error::Error>> {
    Ok(Ledger::with_config(LedgerConfig {
        difficulty: 2,
        ..LedgerConfig::default()
    })?)
}

#[test]
fn test_send_then_mine_scenario() -> Result<(), Box<dyn std::error::Error>> {
    let ledger = fast_ledger()?;
    let reward = ledger.config().mining_reward;
    assert_eq!(ledger.get_balance(&Address::from("godwin")), 100);

    let alice = Wallet::new(&ledger)?;
    let bob = KeyPair::generate();
    assert_eq!(alice.balance(), 100);

    let mut transaction =
        Transaction::with_default_fee(50, alice.address().clone(), bob.address().clone());
    transaction.sign(alice.key_pair());
    ledger.submit_transaction(transaction)?;

    assert_eq!(ledger.get_balance(alice.address()), 48);
    assert_eq!(ledger.get_balance(bob.address()), 50);

    let outcome = ledger.mine_next_block(alice.address())?;
    assert!(matches!(outcome, MiningOutcome::Mined(_)));
    assert_eq!(ledger.get_balance(alice.address()), 48 + reward);
    assert_eq!(ledger.get_balance(bob.address()), 50);

    Ok(())
}

#[test]
fn test_wallet_send_money_scenario() -> Result<(), Box<dyn std::error::Error>> {
    let ledger = fast_ledger()?;
    let alice = Wallet::new(&ledger)?;
    let bob = Wallet::new(&ledger)?;

    let receipt = alice.send_money(50, bob.address())?;

    assert_eq!(receipt.mined.block.transaction.amount, 50);
    assert_eq!(alice.balance(), 48 + 50);
    assert_eq!(bob.balance(), 150);
    assert_eq!(alice.transaction_history().len(), 2);

    bob.send_money(20, alice.address())?;
    assert_eq!(alice.balance(), 98 + 20);
    assert_eq!(bob.balance(), 150 - 22 + 50);

    let chain = ledger.get_chain();
    for pair in chain.windows(2) {
        assert_eq!(pair[1].previous_hash, pair[0].hash());
    }
    assert!(ledger.is_valid());

    Ok(())
}

#[test]
fn test_empty_account_cannot_send() -> Result<(), Box<dyn std::error::Error>> {
    let ledger = fast_ledger()?;
    let broke = KeyPair::generate();
    let supply = ledger.total_supply();

    let mut transaction =
        Transaction::with_default_fee(1, broke.address().clone(), Address::from("godwin"));
    transaction.sign(&broke);

    let err = ledger.submit_transaction(transaction).unwrap_err();
    assert!(matches!(
        err,
        LedgerError::TransactionError(TransactionError::InsufficientBalance { available: 0, .. })
    ));

    assert_eq!(ledger.chain_len(), 1);
    assert_eq!(ledger.get_balance(broke.address()), 0);
    assert_eq!(ledger.get_balance(&Address::from("godwin")), 100);
    assert_eq!(ledger.total_supply(), supply);
    assert!(ledger.get_pending_transactions().is_empty());

    Ok(())
}

#[test]
fn test_tampered_mined_transaction_fails_verification() -> Result<(), Box<dyn std::error::Error>> {
    let ledger = fast_ledger()?;
    let alice = Wallet::new(&ledger)?;

    let receipt = alice.send_money(30, &Address::from("bob"))?;
    let mut mined = receipt.mined.block.transaction.clone();
    assert!(mined.verify());

    mined.amount = 90;
    assert!(!mined.verify());

    let mut chain = ledger.get_chain();
    chain[1].transaction.amount = 90;
    assert!(edu_ledger::ledger::chain::validate_blocks(&chain).is_err());

    Ok(())
}

#[test]
fn test_supply_accounting() -> Result<(), Box<dyn std::error::Error>> {
    let ledger = fast_ledger()?;
    let config = ledger.config().clone();
    let wallets: Vec<Wallet> = (0..3).map(|_| Wallet::new(&ledger)).collect::<Result<_, _>>()?;

    let mut blocks = 0u128;
    for (i, wallet) in wallets.iter().enumerate() {
        let payee = wallets[(i + 1) % wallets.len()].address().clone();
        wallet.send_money(10, &payee)?;
        blocks += 1;
    }

    // Rejected transfers leave supply alone
    assert!(wallets[0].send_money(10_000, &Address::from("x")).is_err());

    let expected = config.genesis_allocation as u128
        + 3 * config.starting_balance as u128
        + blocks * config.mining_reward as u128
        - blocks * config.transaction_fee as u128;
    assert_eq!(ledger.total_supply(), expected);

    Ok(())
}
