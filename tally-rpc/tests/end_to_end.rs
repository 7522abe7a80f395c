use std::path::Path;
use std::sync::{Arc, Mutex};

use anyhow::Result;
use chrono::{TimeZone, Utc};
use tally_core::{AccountSpec, Decimal, ItemSpec, LineInput, MarketPriceSpec, TransactionInput};
use tally_ledger::{LedgerRuntime, RuntimeConfig};
use tally_proto::{code, encode_frame, BodyCodec, CompactCodec, Packet, ProtoCodec};
use tally_rpc::{
    Correlator, CorrelatorStage, DispatchStage, Dispatcher, EncodeStage, PipeValue, Pipeline,
    RpcClient, RpcError, StageId, UnwrapStage,
};
use tempfile::tempdir;
use uuid::Uuid;

/// A server and client wired together through the staged pipeline:
/// unwrap → dispatch → encode → unwrap → deliver-to-correlator.
struct RpcLoop {
    pipeline: Pipeline,
    entry: StageId,
    client: RpcClient,
    correlator: Arc<Correlator>,
}

fn rpc_loop(prefix: &Path, codec: Arc<dyn BodyCodec>) -> RpcLoop {
    let runtime = LedgerRuntime::new(RuntimeConfig {
        prefix: prefix.to_path_buf(),
        decimal_digits: 4,
    });
    let dispatcher = Arc::new(Dispatcher::new(
        Arc::new(Mutex::new(runtime)),
        codec.clone(),
    ));
    let correlator = Arc::new(Correlator::new());

    let mut pipeline = Pipeline::new();
    let server_unwrap = pipeline.add_stage(Box::new(UnwrapStage::new(codec.clone())));
    let dispatch = pipeline.add_stage(Box::new(DispatchStage::new(dispatcher)));
    let encode = pipeline.add_stage(Box::new(EncodeStage::new(codec.clone())));
    let client_unwrap = pipeline.add_stage(Box::new(UnwrapStage::new(codec.clone())));
    let deliver = pipeline.add_stage(Box::new(CorrelatorStage::new(correlator.clone())));
    pipeline.connect(server_unwrap, dispatch).unwrap();
    pipeline.connect(dispatch, encode).unwrap();
    pipeline.connect(encode, client_unwrap).unwrap();
    pipeline.connect(client_unwrap, deliver).unwrap();

    RpcLoop {
        pipeline,
        entry: server_unwrap,
        client: RpcClient::new(codec, correlator.clone()),
        correlator,
    }
}

impl RpcLoop {
    async fn call(&mut self, function: &str, arg: Option<Vec<u8>>) -> Result<Packet, RpcError> {
        let (uuid, receiver, bytes) = self.client.build_request(function, arg)?;
        self.pipeline.feed(self.entry, PipeValue::Bytes(bytes))?;
        self.client.wait(uuid, receiver).await
    }

    async fn create_account(
        &mut self,
        codec: &dyn BodyCodec,
        name: &str,
        parent: Uuid,
    ) -> Result<Uuid> {
        let arg = codec.encode_account(&AccountSpec {
            name: name.into(),
            parent: Some(parent),
        })?;
        let response = self.call("AddAccount", Some(arg)).await?;
        Ok(Uuid::from_slice(&response.body["uuid"])?)
    }
}

fn dec(s: &str) -> Decimal {
    s.parse().unwrap()
}

fn day(day: u32) -> i64 {
    Utc.with_ymd_and_hms(2025, 9, day, 0, 0, 0)
        .single()
        .unwrap()
        .timestamp_millis()
}

#[tokio::test]
async fn owner_investment_scenario_over_rpc() -> Result<()> {
    let dir = tempdir()?;
    let codec: Arc<dyn BodyCodec> = Arc::new(CompactCodec::new());
    let mut rpc = rpc_loop(dir.path(), codec.clone());

    rpc.call("OpenOrCreateDB", None).await?;

    let mains = rpc.call("GetMainAccounts", None).await?;
    let root = |name: &str| Uuid::from_slice(&mains.body[name]).unwrap();
    let (asset, equity, income, expense) = (
        root("asset"),
        root("equity"),
        root("income"),
        root("expense"),
    );

    let cash = rpc.create_account(&*codec, "cash", asset).await?;
    let inventory = rpc.create_account(&*codec, "inventory", asset).await?;
    let raw_material = rpc.create_account(&*codec, "raw material", inventory).await?;
    let wip = rpc.create_account(&*codec, "work in progress", inventory).await?;
    let finished = rpc.create_account(&*codec, "finished product", inventory).await?;
    let mat_purchase = rpc.create_account(&*codec, "material purchase", expense).await?;
    let incoming = rpc.create_account(&*codec, "incoming material", income).await?;

    let item_arg = codec.encode_item(&ItemSpec {
        name: "steel".into(),
        description: "raw material".into(),
        unit: "kg".into(),
    })?;
    let response = rpc.call("AddItem", Some(item_arg)).await?;
    let steel = Uuid::from_slice(&response.body["uuid"])?;

    let transactions = [
        TransactionInput::new("Owner Investment", day(1)).with_lines(vec![
            LineInput::financial(equity, Decimal::ZERO, dec("1000"), "USD"),
            LineInput::financial(cash, dec("1000"), Decimal::ZERO, "USD"),
        ]),
        TransactionInput::new("Purchase Steel", day(2)).with_lines(vec![
            LineInput::inventory(incoming, steel, dec("-100"), "kg", dec("5"), "USD"),
            LineInput::inventory(raw_material, steel, dec("100"), "kg", dec("5"), "USD"),
            LineInput::financial(cash, Decimal::ZERO, dec("500"), "USD"),
            LineInput::financial(mat_purchase, dec("500"), Decimal::ZERO, "USD"),
        ]),
        TransactionInput::new("Use Steel", day(4)).with_lines(vec![
            LineInput::inventory(raw_material, steel, dec("-20"), "kg", dec("5"), "USD"),
            LineInput::inventory(wip, steel, dec("20"), "kg", dec("5"), "USD"),
        ]),
        TransactionInput::new("Complete Widgets", day(5)).with_lines(vec![
            LineInput::inventory(wip, steel, dec("-20"), "kg", dec("5"), "USD"),
            LineInput::inventory(finished, steel, dec("10"), "kg", dec("10"), "USD"),
        ]),
    ];
    for transaction in &transactions {
        let arg = codec.encode_transaction(transaction)?;
        let response = rpc.call("ApplyTransaction", Some(arg)).await?;
        assert_eq!(response.response_code(), Some(code::OK));
        assert_eq!(response.body["uuid"].len(), 16);
    }

    let price_arg = codec.encode_market_price(&MarketPriceSpec {
        item: steel,
        price: dec("6"),
        unit: "kg".into(),
        currency: "USD".into(),
    })?;
    rpc.call("UpdateMarketPrice", Some(price_arg)).await?;

    let response = rpc.call("PrintBalances", None).await?;
    let report = String::from_utf8(response.body["balances"].clone())?;
    assert!(report.contains("asset > inventory > raw material steel | Qty 80.00 | Value 400.00"));
    assert!(report.contains("asset > cash  | Qty 500.00 | Value 500.00"));
    // Equity displays sign-normalised.
    assert!(report.contains("equity  | Qty 1000.00 | Value 1000.00"));

    let response = rpc.call("PrintMarketBalances", None).await?;
    let report = String::from_utf8(response.body["balances"].clone())?;
    assert!(report
        .contains("asset > inventory > raw material steel | Qty 80.00 | MarketValue 480.00 USD"));

    Ok(())
}

#[tokio::test]
async fn precondition_ordering_over_the_wire() -> Result<()> {
    let dir = tempdir()?;
    let codec: Arc<dyn BodyCodec> = Arc::new(CompactCodec::new());
    let mut rpc = rpc_loop(dir.path(), codec.clone());

    // A request with no function key at all.
    let uuid = tally_core::new_id();
    let bare = Packet::request(uuid);
    let receiver = rpc.correlator.register(uuid);
    let framed = encode_frame(&codec.encode_packet(&bare)?);
    rpc.pipeline.feed(rpc.entry, PipeValue::Bytes(framed))?;
    let response = receiver.await?;
    assert_eq!(response.response_code(), Some(code::MISSING_FUNCTION));

    // Known function before any database is open.
    let err = rpc.call("AddItem", None).await.unwrap_err();
    assert!(matches!(
        err,
        RpcError::Response {
            code: code::NO_CURRENT_DB,
            ..
        }
    ));

    // After opening, the missing argument is the failure.
    rpc.call("OpenOrCreateDB", None).await?;
    let err = rpc.call("AddItem", Some(Vec::new())).await.unwrap_err();
    assert!(matches!(
        err,
        RpcError::Response {
            code: code::MISSING_ARG,
            ..
        }
    ));

    // Unknown functions are rejected regardless of database state.
    let err = rpc.call("Frobnicate", None).await.unwrap_err();
    assert!(matches!(
        err,
        RpcError::Response {
            code: code::UNKNOWN_FUNCTION,
            ..
        }
    ));

    Ok(())
}

#[tokio::test]
async fn split_request_bytes_still_dispatch() -> Result<()> {
    let dir = tempdir()?;
    let codec: Arc<dyn BodyCodec> = Arc::new(CompactCodec::new());
    let mut rpc = rpc_loop(dir.path(), codec);

    let (uuid, receiver, bytes) = rpc.client.build_request("OpenOrCreateDB", None)?;
    let split = bytes.len() / 2;
    rpc.pipeline
        .feed(rpc.entry, PipeValue::Bytes(bytes[..split].to_vec()))?;
    rpc.pipeline
        .feed(rpc.entry, PipeValue::Bytes(bytes[split..].to_vec()))?;

    let response = rpc.client.wait(uuid, receiver).await?;
    assert_eq!(response.response_code(), Some(code::OK));
    assert_eq!(response.uuid, uuid);
    Ok(())
}

#[tokio::test]
async fn proto_codec_serves_the_same_surface() -> Result<()> {
    let dir = tempdir()?;
    let codec: Arc<dyn BodyCodec> = Arc::new(ProtoCodec::new());
    let mut rpc = rpc_loop(dir.path(), codec.clone());

    rpc.call("OpenOrCreateDB", None).await?;
    let mains = rpc.call("GetMainAccounts", None).await?;
    for name in tally_core::ROOT_ACCOUNT_NAMES {
        assert_eq!(mains.body[name].len(), 16);
    }

    let asset = Uuid::from_slice(&mains.body["asset"])?;
    let cash = rpc.create_account(&*codec, "cash", asset).await?;
    assert_ne!(cash, asset);

    let item_arg = codec.encode_item(&ItemSpec {
        name: "widget".into(),
        description: String::new(),
        unit: "pcs".into(),
    })?;
    let response = rpc.call("AddItem", Some(item_arg)).await?;
    assert_eq!(response.response_code(), Some(code::OK));
    Ok(())
}

#[test]
fn concurrent_applies_to_independent_databases() -> Result<()> {
    let dir = tempdir()?;
    let mut runtime = LedgerRuntime::new(RuntimeConfig {
        prefix: dir.path().to_path_buf(),
        decimal_digits: 4,
    });

    let mut handles = Vec::new();
    for _ in 0..2 {
        runtime.open_or_create(None)?;
        let db = runtime.current().expect("just opened");
        let tree_root = db
            .main_accounts()?
            .into_iter()
            .find(|account| account.name == "asset")
            .expect("asset root");
        let stock = db.add_account(&AccountSpec {
            name: "stock".into(),
            parent: Some(tree_root.uuid),
        })?;
        let item = db.add_item(&ItemSpec {
            name: "bolt".into(),
            description: String::new(),
            unit: "pcs".into(),
        })?;
        handles.push((db, stock, item));
    }

    let workers: Vec<_> = handles
        .into_iter()
        .enumerate()
        .map(|(worker, (db, stock, item))| {
            std::thread::spawn(move || -> Result<String> {
                for i in 0..20 {
                    db.apply_transaction(
                        &TransactionInput::new(format!("batch {worker}"), 1_000 + i).with_lines(
                            vec![LineInput::inventory(
                                stock,
                                item,
                                dec("1"),
                                "pcs",
                                dec("2"),
                                "USD",
                            )],
                        ),
                    )?;
                }
                Ok(db.balances_report()?)
            })
        })
        .collect();

    for worker in workers {
        let report = worker.join().expect("worker panicked")?;
        // Each database saw exactly its own twenty applies.
        assert!(report.contains("asset > stock bolt | Qty 20.00 | Value 40.00"));
    }
    Ok(())
}
