use std::{str::from_utf8, sync::Arc};

use chrono::{TimeZone, Utc};
use rust_decimal::Decimal;
use wallet_ledger::{
    bin_utils::{
        Service,
        args::{Command, HistoryArgs},
    },
    command::{CreateTransactionCommand, CreateWalletCommand, TransactionDraft},
    controller::{WalletController, WalletCreation},
    export::ExportScope,
    query::{SortField, SortOrder, TransactionQuery},
    session::MemorySessionStorage,
    store::{LedgerError, LedgerStore, in_memory_store::InMemoryLedgerStore},
    wallet::{TransactionKind, Wallet},
};

fn new_year_store() -> InMemoryLedgerStore {
    InMemoryLedgerStore::with_clock(|| Utc.with_ymd_and_hms(2024, 1, 1, 12, 0, 0).unwrap())
}

async fn create(store: &impl LedgerStore, name: &str, balance: &str) -> Wallet {
    store
        .create_wallet(&CreateWalletCommand::parse(name, Some(balance)).unwrap())
        .await
        .unwrap()
}

fn transaction(wallet: &Wallet, amount: i64, version: u64) -> CreateTransactionCommand {
    CreateTransactionCommand::new(wallet.id.clone(), Decimal::new(amount, 0), "test", version)
        .unwrap()
}

#[tokio::test]
async fn stale_version_is_rejected() {
    let store = InMemoryLedgerStore::default();
    let alice = create(&store, "Alice", "100").await;
    assert_eq!(alice.version, 0);

    let deposit =
        CreateTransactionCommand::new(alice.id.clone(), Decimal::new(50_5, 1), "gift", 0).unwrap();
    let tx = store.create_transaction(&deposit).await.unwrap();
    assert_eq!(tx.balance.to_string(), "150.5000");
    assert_eq!(tx.kind(), TransactionKind::Credit);

    let wallet = store.find_wallet_by_id(&alice.id).await.unwrap();
    assert_eq!(wallet.balance.to_string(), "150.5000");
    assert_eq!(wallet.version, 1);

    let err = store
        .create_transaction(&transaction(&alice, -200, 0))
        .await
        .unwrap_err();
    assert!(matches!(err, LedgerError::VersionMismatch { .. }));

    let wallet = store.find_wallet_by_id(&alice.id).await.unwrap();
    assert_eq!(wallet.balance.to_string(), "150.5000");
    assert_eq!(wallet.version, 1);
    assert_eq!(store.transactions_of(&alice.id).len(), 1);
}

#[tokio::test]
async fn version_counts_accepted_transactions() {
    let store = InMemoryLedgerStore::default();
    let wallet = create(&store, "Bob", "0").await;

    let mut accepted = 0;
    for (amount, version) in [(10, 0), (5, 0), (-3, 1), (7, 1), (7, 2), (1, 9)] {
        if store
            .create_transaction(&transaction(&wallet, amount, version))
            .await
            .is_ok()
        {
            accepted += 1;
        }
    }
    let wallet = store.find_wallet_by_id(&wallet.id).await.unwrap();
    assert_eq!(accepted, 3);
    assert_eq!(wallet.version, 3);
    assert_eq!(wallet.balance, Decimal::new(14, 0));
    assert_eq!(store.audit(&wallet.id).unwrap(), Decimal::new(14, 0));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn one_winner_per_version() {
    let store = Arc::new(InMemoryLedgerStore::default());
    let wallet = create(&store, "Carol", "100").await;

    let handles: Vec<_> = (0..16)
        .map(|i| {
            let store = Arc::clone(&store);
            let command = transaction(&wallet, i + 1, 0);
            tokio::spawn(async move { store.create_transaction(&command).await })
        })
        .collect();

    let mut winners = 0;
    for handle in handles {
        match handle.await.unwrap() {
            Ok(_) => winners += 1,
            Err(err) => assert!(matches!(err, LedgerError::VersionMismatch { .. })),
        }
    }
    assert_eq!(winners, 1);
    let wallet = store.find_wallet_by_id(&wallet.id).await.unwrap();
    assert_eq!(wallet.version, 1);
    store.audit(&wallet.id).unwrap();
}

#[tokio::test]
async fn pages_are_stable_and_disjoint() {
    // every transaction gets the same timestamp, so only the id orders them
    let store = new_year_store();
    let wallet = create(&store, "Dave", "0").await;
    for version in 0..25 {
        store
            .create_transaction(&transaction(&wallet, 1, version))
            .await
            .unwrap();
    }

    let mut seen = Vec::new();
    for page in 1..=3 {
        let query = TransactionQuery::for_page(wallet.id.clone(), page, 10);
        let first = store.query_transactions(&query).await.unwrap();
        let again = store.query_transactions(&query).await.unwrap();
        assert_eq!(first, again);
        assert_eq!(first.page, page);
        assert_eq!(first.total_count, 25);
        seen.extend(first.data.into_iter().map(|tx| tx.id));
    }
    assert_eq!(seen.len(), 25);
    let mut unique = seen.clone();
    unique.sort();
    unique.dedup();
    assert_eq!(unique.len(), 25);
}

#[tokio::test]
async fn search_and_sort_history() {
    let store = InMemoryLedgerStore::default();
    let wallet = create(&store, "Erin", "1000").await;
    let rows = [(-120, "Rent March"), (300, "salary"), (-45, "groceries"), (-80, "RENT deposit")];
    for (version, (amount, description)) in rows.into_iter().enumerate() {
        let command = CreateTransactionCommand::new(
            wallet.id.clone(),
            Decimal::new(amount, 0),
            description,
            version as u64,
        )
        .unwrap();
        store.create_transaction(&command).await.unwrap();
    }

    let query = TransactionQuery::new(wallet.id.clone())
        .with_search("rent")
        .sorted_by(SortField::Amount, Some(SortOrder::Asc));
    let page = store.query_transactions(&query).await.unwrap();
    assert_eq!(page.total_count, 2);
    let amounts: Vec<_> = page.data.iter().map(|tx| tx.amount).collect();
    assert_eq!(amounts, [Decimal::new(-120, 0), Decimal::new(-80, 0)]);

    // numeric text matches the balance column too
    let query = TransactionQuery::new(wallet.id.clone()).with_search("1180");
    let page = store.query_transactions(&query).await.unwrap();
    assert_eq!(page.total_count, 1);
    assert_eq!(page.data[0].description, "salary");
}

#[tokio::test]
async fn export_displayed_page_and_everything() {
    let controller = WalletController::new(new_year_store(), MemorySessionStorage::default());
    let created = controller
        .create_wallet(CreateWalletCommand::parse("Frank", Some("100")).unwrap())
        .await
        .unwrap();
    let WalletCreation::Created(wallet) = created else {
        panic!("expected a new wallet");
    };
    controller
        .submit_transaction(TransactionDraft::parse("10", "x", TransactionKind::Debit).unwrap())
        .await
        .unwrap();
    controller
        .submit_transaction(TransactionDraft::parse("2.5", "y", TransactionKind::Credit).unwrap())
        .await
        .unwrap();

    let query = TransactionQuery::for_page(wallet.id.clone(), 2, 1)
        .sorted_by(SortField::Amount, Some(SortOrder::Asc));
    let page = controller.load_history(query).await.unwrap().unwrap();
    assert_eq!(page.data.len(), 1);

    let file = controller.export(ExportScope::Page).await.unwrap();
    assert_eq!(file.filename, "page_transactions.csv");
    assert_eq!(
        file.contents,
        format!(
            "Type,Date,Amount,Updated Balance,Description,Wallet ID\n\
             Credit,1/1/2024,2.50,92.50,y,{}",
            wallet.id
        )
    );

    let file = controller.export(ExportScope::All).await.unwrap();
    assert_eq!(file.filename, "all_transactions.csv");
    let lines: Vec<&str> = file.contents.lines().collect();
    assert_eq!(lines.len(), 3);
    assert_eq!(lines[1], format!("Debit,1/1/2024,10.00,90.00,x,{}", wallet.id));
}

#[tokio::test]
async fn mismatch_refreshes_the_stale_client() {
    let store = Arc::new(InMemoryLedgerStore::default());
    let laptop = WalletController::new(Arc::clone(&store), MemorySessionStorage::default());
    let phone = WalletController::new(Arc::clone(&store), MemorySessionStorage::default());

    let WalletCreation::Created(wallet) = laptop
        .create_wallet(CreateWalletCommand::parse("Grace", Some("50")).unwrap())
        .await
        .unwrap()
    else {
        panic!("expected a new wallet");
    };
    let taken = phone
        .create_wallet(CreateWalletCommand::parse("Grace", None).unwrap())
        .await
        .unwrap();
    assert_eq!(taken, WalletCreation::NameTaken(wallet.clone()));
    phone.adopt_wallet(wallet).await.unwrap();

    let debit = || TransactionDraft::parse("20", "lunch", TransactionKind::Debit).unwrap();
    laptop.submit_transaction(debit()).await.unwrap();

    let err = phone.submit_transaction(debit()).await.unwrap_err();
    assert!(matches!(err, LedgerError::VersionMismatch { .. }));
    let refreshed = phone.active_wallet().await.unwrap();
    assert_eq!(refreshed.version, 1);
    assert_eq!(refreshed.balance, Decimal::new(30, 0));

    phone.submit_transaction(debit()).await.unwrap();
    let wallet = phone.active_wallet().await.unwrap();
    assert_eq!(wallet.version, 2);
    assert_eq!(wallet.balance, Decimal::new(10, 0));
}

#[tokio::test]
async fn drive_cli_service() {
    let store = Arc::new(new_year_store());
    let out_dir = tempfile::tempdir().unwrap();
    let mut output = Vec::new();
    let mut errors = Vec::new();

    {
        let mut service = Service {
            controller: WalletController::new(Arc::clone(&store), MemorySessionStorage::default()),
            input: "y\n".as_bytes(),
            output: &mut output,
            error_printer: Box::new(|err: &LedgerError| errors.push(err.notice())),
        };
        let commands = [
            Command::Create {
                name: "Heidi".to_string(),
                balance: Some("1000".to_string()),
            },
            Command::Deposit {
                amount: "$250.25".to_string(),
                description: "refund".to_string(),
            },
            Command::Withdraw {
                amount: "0".to_string(),
                description: "nothing".to_string(),
            },
            Command::History(HistoryArgs::default()),
            Command::Export {
                view: HistoryArgs::default(),
                all: true,
                out: out_dir.path().to_path_buf(),
            },
            Command::Logout,
            Command::Show,
            // the name is taken now, the queued "y" adopts the wallet again
            Command::Create {
                name: "Heidi".to_string(),
                balance: None,
            },
        ];
        for command in commands {
            service.run(command).await.unwrap();
        }
    }

    let text = from_utf8(&output).unwrap();
    assert!(text.contains("Wallet created successfully for Heidi"));
    assert!(text.contains("Transaction successful: Added 250.2500, balance 1,250.2500"));
    assert!(text.contains("Page 1 of 1, 1 transactions in total"));
    assert!(text.contains("No active wallet."));
    assert!(text.contains("A wallet already exists with the name Heidi."));
    assert!(text.contains("Using wallet Heidi"));
    assert_eq!(errors, ["Amount must be a positive number"]);

    let exported = std::fs::read_to_string(out_dir.path().join("all_transactions.csv")).unwrap();
    let lines: Vec<&str> = exported.lines().collect();
    assert_eq!(lines.len(), 2);
    assert!(lines[1].starts_with("Credit,1/1/2024,250.25,1250.25,refund,"));
}

#[tokio::test]
async fn rejected_cli_input_does_not_bump_the_version() {
    let store = Arc::new(InMemoryLedgerStore::default());
    let mut output = Vec::new();
    let mut errors = Vec::new();
    let mut service = Service {
        controller: WalletController::new(Arc::clone(&store), MemorySessionStorage::default()),
        input: "".as_bytes(),
        output: &mut output,
        error_printer: Box::new(|err: &LedgerError| errors.push(err.notice())),
    };

    let deposit = |amount: &str, description: &str| Command::Deposit {
        amount: amount.to_string(),
        description: description.to_string(),
    };
    let commands = [
        Command::Create {
            name: "Ivan".to_string(),
            balance: Some("100".to_string()),
        },
        deposit("5", "first"),
        deposit("0", "nothing"),
        deposit("3", "   "),
        deposit("1.000001", "too precise"),
        Command::Withdraw {
            amount: "2".to_string(),
            description: "second".to_string(),
        },
    ];
    for command in commands {
        service.run(command).await.unwrap();
    }

    let wallet = service.controller.active_wallet().await.unwrap();
    drop(service);
    assert_eq!(errors.len(), 3);
    assert_eq!(wallet.version, 2);
    assert_eq!(wallet.balance, Decimal::new(103, 0));
    assert_eq!(store.find_wallet_by_id(&wallet.id).await.unwrap(), wallet);
    assert_eq!(store.audit(&wallet.id).unwrap(), wallet.balance);
}
