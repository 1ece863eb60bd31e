//! Pre-execution checks of a contract against its specification.

use crate::error::ValidationError;
use covenant_model::{Contract, ContractSpecification, PartyType};
use std::collections::BTreeSet;

/// Run every check; the first failure wins.
pub fn validate_all(contract: &Contract, spec: &ContractSpecification) -> Result<(), ValidationError> {
    recitals_match(contract, spec)?;
    facts_supplied(contract, spec)?;
    Ok(())
}

/// Recital roles must equal `parties_involved`, counted with multiplicity.
pub fn recitals_match(contract: &Contract, spec: &ContractSpecification) -> Result<(), ValidationError> {
    let mut required: Vec<String> = spec.parties_involved.iter().map(|r| role_name(*r)).collect();
    let mut specified: Vec<String> = contract.recitals.iter().map(|r| role_name(r.signer_role)).collect();
    required.sort();
    specified.sort();

    if required != specified {
        return Err(ValidationError::RecitalMismatch { required, specified });
    }
    Ok(())
}

/// Every `input_specs` name must be supplied as an input with content.
pub fn facts_supplied(contract: &Contract, spec: &ContractSpecification) -> Result<(), ValidationError> {
    let mut required: Vec<String> = spec.input_specs.iter().map(|s| s.name.clone()).collect();
    required.sort();

    let wanted: BTreeSet<&str> = required.iter().map(String::as_str).collect();
    let specified: Vec<String> = contract
        .inputs
        .iter()
        .filter(|input| input.has_content() && wanted.contains(input.name.as_str()))
        .map(|input| input.name.clone())
        .collect::<BTreeSet<_>>()
        .into_iter()
        .collect();

    if required != specified {
        return Err(ValidationError::FactsMismatch { required, specified });
    }
    Ok(())
}

/// Upper-case role name, `UNKNOWN(n)` for values outside the enum.
fn role_name(value: i32) -> String {
    match PartyType::try_from(value) {
        Ok(role) => format!("{:?}", role).to_uppercase(),
        Err(_) => format!("UNKNOWN({})", value),
    }
}
