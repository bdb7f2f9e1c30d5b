//! Schema validation contract.
//!
//! The engine only consumes pass/fail. Rule sets are pluggable; the
//! [`BasicValidator`] checks structure the engine itself depends on.

use std::collections::HashSet;

use penalty_schemas::{DocumentInput, GroupInput, GroupPaymentInfo, PaymentInfo, PenaltyType};

pub trait Validator: Send + Sync {
    fn document(&self, input: &DocumentInput) -> Result<(), String>;
    fn group(&self, input: &GroupInput) -> Result<(), String>;
    fn payment(&self, info: &PaymentInfo) -> Result<(), String>;
    fn group_payment(&self, info: &GroupPaymentInfo) -> Result<(), String>;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct BasicValidator;

fn document_type(id: &str) -> Result<PenaltyType, String> {
    if id.trim().is_empty() {
        return Err("ID must not be empty".into());
    }
    PenaltyType::from_document_id(id)
        .ok_or_else(|| format!("ID {id:?} must end in _FPN, _IM or _CDN"))
}

impl Validator for BasicValidator {
    fn document(&self, input: &DocumentInput) -> Result<(), String> {
        let ty = document_type(&input.id)?;
        let v = &input.value;

        if let Some(declared) = v.penalty_type {
            if declared != ty {
                return Err(format!(
                    "penaltyType {} does not match ID suffix {}",
                    declared.as_str(),
                    ty.as_str()
                ));
            }
        }
        if let Some(reference) = &v.reference_no {
            if ty.document_id(reference) != input.id {
                return Err(format!("referenceNo {reference:?} does not match ID {:?}", input.id));
            }
        }
        if v.penalty_amount.is_some_and(|a| a < 0) {
            return Err("penaltyAmount must not be negative".into());
        }
        Ok(())
    }

    fn group(&self, input: &GroupInput) -> Result<(), String> {
        if !(input.timestamp.is_finite() && input.timestamp > 0.0) {
            return Err("Timestamp must be a positive number".into());
        }
        if input.site_code == 0 {
            return Err("SiteCode must not be zero".into());
        }
        if input.penalties.is_empty() {
            return Err("a group needs at least one penalty".into());
        }

        let mut seen = HashSet::new();
        for doc in &input.penalties {
            self.document(doc)?;
            if !seen.insert(doc.id.as_str()) {
                return Err(format!("duplicate penalty {:?} in group", doc.id));
            }
        }
        Ok(())
    }

    fn payment(&self, info: &PaymentInfo) -> Result<(), String> {
        document_type(&info.id)?;
        if info.penalty_amount.is_some_and(|a| a < 0) {
            return Err("penaltyAmount must not be negative".into());
        }
        Ok(())
    }

    fn group_payment(&self, _info: &GroupPaymentInfo) -> Result<(), String> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use penalty_schemas::PenaltyValue;

    fn doc(id: &str) -> DocumentInput {
        DocumentInput {
            id: id.into(),
            value: PenaltyValue::default(),
            enabled: None,
            hash: None,
            origin: None,
        }
    }

    #[test]
    fn document_rules() {
        let v = BasicValidator;
        assert!(v.document(&doc("1_FPN")).is_ok());
        assert!(v.document(&doc("1")).is_err());
        assert!(v.document(&doc("")).is_err());

        let mut d = doc("1_FPN");
        d.value.penalty_type = Some(PenaltyType::Im);
        assert!(v.document(&d).is_err());

        let mut d = doc("1_FPN");
        d.value.reference_no = Some("2".into());
        assert!(v.document(&d).is_err());

        let mut d = doc("1_FPN");
        d.value.penalty_amount = Some(-1);
        assert!(v.document(&d).is_err());
    }

    #[test]
    fn group_rules() {
        let v = BasicValidator;
        let mut g = GroupInput {
            timestamp: 1532945465.234,
            site_code: -72,
            location: None,
            vehicle_registration: None,
            origin: None,
            penalties: vec![doc("1_FPN"), doc("1_IM")],
        };
        assert!(v.group(&g).is_ok());

        g.penalties.push(doc("1_FPN"));
        assert!(v.group(&g).is_err());

        g.penalties.clear();
        assert!(v.group(&g).is_err());
    }
}
