//! Successful executions: PASS and SKIP results, audience, ancestry and sealing.

mod common;

use common::*;
use covenant_model::{
    crypto, verify_contract_signature, Consideration, ExecutionResult, Hash, KeyRef,
    ProposedRecord, ResultType, ScopeRecord, ScopeState,
};
use std::collections::BTreeSet;

#[tokio::test]
async fn test_proposed_asset_passes_and_is_stored() {
    let fx = Fixture::new();
    let contract = fx.contract(vec![fx.asset_consideration("asset", "a-1")]);

    let envelope = fx.run(contract).await.unwrap();
    let contract = envelope.contract.as_ref().unwrap();
    let result = contract.considerations[0].result.as_ref().unwrap();

    assert_eq!(result.result(), ResultType::Pass);
    assert!(result.error_message.is_empty());
    let output = result.output.as_ref().unwrap();
    assert_eq!(output.name, "asset");
    assert_eq!(output.classname, ASSET);
    assert_eq!(output.content_hash(), Some(crypto::content_hash(&record_bytes("a-1"))));
    assert!(output.ancestor_hash.is_empty());
    assert_eq!(fx.store.write_count(), 1);
}

#[tokio::test]
async fn test_sealed_envelope_carries_one_verifiable_signature() {
    let fx = Fixture::new();
    let contract = fx.contract(vec![fx.asset_consideration("asset", "a-1")]);

    let envelope = fx.run(contract).await.unwrap();
    assert_eq!(envelope.signatures.len(), 1);
    let signature = &envelope.signatures[0];
    assert_eq!(signature.signer, fx.signer.public_key().to_vec());
    verify_contract_signature(envelope.contract.as_ref().unwrap(), signature).unwrap();
}

#[tokio::test]
async fn test_existing_and_proposed_records_feed_one_function() {
    let fx = Fixture::new();
    let mut contract = fx.contract(vec![
        Consideration::new("valuation").with_input(fx.proposed("valuation", VALUATION, "v-1")),
    ]);
    contract.inputs.push(fx.existing("asset", ASSET, "a-2"));

    let envelope = fx.run(contract).await.unwrap();
    let result = envelope.contract.unwrap().considerations[0].result.clone().unwrap();
    assert_eq!(result.result(), ResultType::Pass);
    let output = result.output.unwrap();
    assert_eq!(output.name, "valuation");
    assert_eq!(output.classname, VALUATION);
    assert_eq!(output.content_hash(), Some(crypto::content_hash(&record_bytes("v-1"))));
}

#[tokio::test]
async fn test_outputs_are_readable_by_recitals_and_extra_audience() {
    let fx = Fixture::new();
    let auditor = KeyRef::from_secret_bytes(&[9u8; 32]).public_key();
    let contract = fx.contract(vec![fx.asset_consideration("asset", "a-3")]);

    let envelope = fx.run_with(contract, None, &[auditor]).await.unwrap();
    let output = envelope.contract.unwrap().considerations[0]
        .result
        .clone()
        .and_then(|r| r.output)
        .unwrap();

    let audience = fx.store.audience_of(&output.content_hash().unwrap()).unwrap();
    assert_eq!(audience, BTreeSet::from([fx.owner.public_key(), auditor]));
}

#[tokio::test]
async fn test_prior_scope_output_becomes_ancestor() {
    let fx = Fixture::new();
    let prior = Hash([9u8; 32]);
    let scope = ScopeState {
        scope_uuid: "scope".to_string(),
        records: vec![ScopeRecord {
            name: "asset".to_string(),
            outputs: vec![ProposedRecord::new("asset", ASSET, prior)],
        }],
    };
    let contract = fx.contract(vec![fx.asset_consideration("asset", "a-4")]);

    let envelope = fx.run_with(contract, Some(&scope), &[]).await.unwrap();
    let output = envelope.contract.unwrap().considerations[0]
        .result
        .clone()
        .and_then(|r| r.output)
        .unwrap();
    assert_eq!(output.ancestor(), Some(prior));
}

#[tokio::test]
async fn test_unrelated_scope_record_leaves_no_ancestor() {
    let fx = Fixture::new();
    let scope = ScopeState {
        scope_uuid: "scope".to_string(),
        records: vec![ScopeRecord {
            name: "valuation".to_string(),
            outputs: vec![ProposedRecord::new("valuation", VALUATION, Hash([9u8; 32]))],
        }],
    };
    let contract = fx.contract(vec![fx.asset_consideration("asset", "a-5")]);

    let envelope = fx.run_with(contract, Some(&scope), &[]).await.unwrap();
    let output = envelope.contract.unwrap().considerations[0]
        .result
        .clone()
        .and_then(|r| r.output)
        .unwrap();
    assert_eq!(output.ancestor(), None);
}

#[tokio::test]
async fn test_unsatisfied_parameter_skips() {
    let fx = Fixture::new();
    // No existing "asset" record on the contract.
    let contract = fx.contract(vec![
        Consideration::new("valuation").with_input(fx.proposed("valuation", VALUATION, "v-2")),
    ]);

    let envelope = fx.run(contract).await.unwrap();
    let result = envelope.contract.unwrap().considerations[0].result.clone().unwrap();
    assert_eq!(result, ExecutionResult::skip("valuation", VALUATION));
    assert_eq!(fx.store.write_count(), 0);
}

#[tokio::test]
async fn test_proposed_record_of_wrong_type_skips() {
    let fx = Fixture::new();
    let contract = fx.contract(vec![
        Consideration::new("asset").with_input(fx.proposed("asset", VALUATION, "v-3")),
    ]);

    let envelope = fx.run(contract).await.unwrap();
    let considerations = envelope.contract.unwrap().considerations;
    assert_eq!(considerations[0].outcome(), ResultType::Skip);
}

#[tokio::test]
async fn test_existing_record_forces_skip() {
    let fx = Fixture::new();
    let mut contract = fx.contract(vec![fx.asset_consideration("once", "a-6")]);
    contract.inputs.push(fx.existing("asset", ASSET, "a-7"));

    let envelope = fx.run(contract).await.unwrap();
    let considerations = envelope.contract.unwrap().considerations;
    assert_eq!(considerations[0].outcome(), ResultType::Skip);

    let fx = Fixture::new();
    let contract = fx.contract(vec![fx.asset_consideration("once", "a-6")]);
    let envelope = fx.run(contract).await.unwrap();
    let considerations = envelope.contract.unwrap().considerations;
    assert_eq!(considerations[0].outcome(), ResultType::Pass);
}

#[tokio::test]
async fn test_completed_considerations_are_not_rerun() {
    let fx = Fixture::new();
    let mut done = fx.asset_consideration("explode", "a-8");
    done.result = Some(ExecutionResult::skip("explode", ASSET));
    let contract = fx.contract(vec![done.clone(), fx.asset_consideration("asset", "a-9")]);

    let envelope = fx.run(contract).await.unwrap();
    let considerations = envelope.contract.unwrap().considerations;
    assert_eq!(considerations[0], done);
    assert_eq!(considerations[1].outcome(), ResultType::Pass);
    assert_eq!(fx.store.write_count(), 1);
}

#[tokio::test]
async fn test_many_outputs_keep_their_slots() {
    let fx = Fixture::new();
    let ids = ["b-1", "b-2", "b-3", "b-4", "b-5"];
    let contract = fx.contract(ids.iter().map(|id| fx.asset_consideration("asset", id)).collect());

    let envelope = fx.run(contract).await.unwrap();
    let considerations = envelope.contract.unwrap().considerations;
    for (consideration, id) in considerations.iter().zip(ids) {
        let output = consideration.result.as_ref().and_then(|r| r.output.as_ref()).unwrap();
        assert_eq!(output.content_hash(), Some(crypto::content_hash(&record_bytes(id))));
    }
    assert_eq!(fx.store.write_count(), ids.len());
}
