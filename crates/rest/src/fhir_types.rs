//! The resource type universe.
//!
//! The engine serves FHIR R4. The universe of resource type names is fixed at
//! build time; membership checks go through a hash set so dispatch on an
//! unknown type is rejected in constant time.

use std::collections::HashSet;
use std::sync::LazyLock;

/// FHIR version served by the engine.
pub const FHIR_VERSION: &str = "4.0.1";

/// R4 resource types, in alphabetical order.
const R4_RESOURCE_TYPES: &[&str] = &[
    "Account",
    "ActivityDefinition",
    "AdverseEvent",
    "AllergyIntolerance",
    "Appointment",
    "AppointmentResponse",
    "AuditEvent",
    "Basic",
    "Binary",
    "BiologicallyDerivedProduct",
    "BodyStructure",
    "Bundle",
    "CapabilityStatement",
    "CarePlan",
    "CareTeam",
    "CatalogEntry",
    "ChargeItem",
    "ChargeItemDefinition",
    "Claim",
    "ClaimResponse",
    "ClinicalImpression",
    "CodeSystem",
    "Communication",
    "CommunicationRequest",
    "CompartmentDefinition",
    "Composition",
    "ConceptMap",
    "Condition",
    "Consent",
    "Contract",
    "Coverage",
    "CoverageEligibilityRequest",
    "CoverageEligibilityResponse",
    "DetectedIssue",
    "Device",
    "DeviceDefinition",
    "DeviceMetric",
    "DeviceRequest",
    "DeviceUseStatement",
    "DiagnosticReport",
    "DocumentManifest",
    "DocumentReference",
    "EffectEvidenceSynthesis",
    "Encounter",
    "Endpoint",
    "EnrollmentRequest",
    "EnrollmentResponse",
    "EpisodeOfCare",
    "EventDefinition",
    "Evidence",
    "EvidenceVariable",
    "ExampleScenario",
    "ExplanationOfBenefit",
    "FamilyMemberHistory",
    "Flag",
    "Goal",
    "GraphDefinition",
    "Group",
    "GuidanceResponse",
    "HealthcareService",
    "ImagingStudy",
    "Immunization",
    "ImmunizationEvaluation",
    "ImmunizationRecommendation",
    "ImplementationGuide",
    "InsurancePlan",
    "Invoice",
    "Library",
    "Linkage",
    "List",
    "Location",
    "Measure",
    "MeasureReport",
    "Media",
    "Medication",
    "MedicationAdministration",
    "MedicationDispense",
    "MedicationKnowledge",
    "MedicationRequest",
    "MedicationStatement",
    "MedicinalProduct",
    "MedicinalProductAuthorization",
    "MedicinalProductContraindication",
    "MedicinalProductIndication",
    "MedicinalProductIngredient",
    "MedicinalProductInteraction",
    "MedicinalProductManufactured",
    "MedicinalProductPackaged",
    "MedicinalProductPharmaceutical",
    "MedicinalProductUndesirableEffect",
    "MessageDefinition",
    "MessageHeader",
    "MolecularSequence",
    "NamingSystem",
    "NutritionOrder",
    "Observation",
    "ObservationDefinition",
    "OperationDefinition",
    "OperationOutcome",
    "Organization",
    "OrganizationAffiliation",
    "Parameters",
    "Patient",
    "PaymentNotice",
    "PaymentReconciliation",
    "Person",
    "PlanDefinition",
    "Practitioner",
    "PractitionerRole",
    "Procedure",
    "Provenance",
    "Questionnaire",
    "QuestionnaireResponse",
    "RelatedPerson",
    "RequestGroup",
    "ResearchDefinition",
    "ResearchElementDefinition",
    "ResearchStudy",
    "ResearchSubject",
    "RiskAssessment",
    "RiskEvidenceSynthesis",
    "Schedule",
    "SearchParameter",
    "ServiceRequest",
    "Slot",
    "Specimen",
    "SpecimenDefinition",
    "StructureDefinition",
    "StructureMap",
    "Subscription",
    "Substance",
    "SubstanceNucleicAcid",
    "SubstancePolymer",
    "SubstanceProtein",
    "SubstanceReferenceInformation",
    "SubstanceSourceMaterial",
    "SubstanceSpecification",
    "SupplyDelivery",
    "SupplyRequest",
    "Task",
    "TerminologyCapabilities",
    "TestReport",
    "TestScript",
    "ValueSet",
    "VerificationResult",
    "VisionPrescription",
];

static RESOURCE_TYPE_SET: LazyLock<HashSet<&'static str>> =
    LazyLock::new(|| R4_RESOURCE_TYPES.iter().copied().collect());

/// Returns every resource type name, sorted.
///
/// # Example
///
/// ```rust
/// use helios_engine::fhir_types::get_resource_type_names;
///
/// let types = get_resource_type_names();
/// assert!(types.contains(&"Patient"));
/// assert!(types.contains(&"OperationDefinition"));
/// ```
pub fn get_resource_type_names() -> &'static [&'static str] {
    R4_RESOURCE_TYPES
}

/// Checks if a resource type name is part of the universe.
///
/// The comparison is case-sensitive.
///
/// ```rust
/// use helios_engine::fhir_types::is_valid_resource_type;
///
/// assert!(is_valid_resource_type("Observation"));
/// assert!(!is_valid_resource_type("patient"));
/// ```
pub fn is_valid_resource_type(type_name: &str) -> bool {
    RESOURCE_TYPE_SET.contains(type_name)
}

/// Returns the FHIR version string advertised in CapabilityStatements.
pub fn get_fhir_version() -> &'static str {
    FHIR_VERSION
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_get_resource_type_names() {
        let types = get_resource_type_names();

        assert!(types.contains(&"Patient"));
        assert!(types.contains(&"Observation"));
        assert!(types.contains(&"Bundle"));
        assert!(types.contains(&"CapabilityStatement"));
        assert!(types.contains(&"OperationDefinition"));
        assert!(types.contains(&"Parameters"));
    }

    #[test]
    fn test_universe_is_sorted_and_unique() {
        let types = get_resource_type_names();
        assert!(types.windows(2).all(|w| w[0] < w[1]));
        assert_eq!(RESOURCE_TYPE_SET.len(), types.len());
    }

    #[test]
    fn test_is_valid_resource_type() {
        assert!(is_valid_resource_type("Patient"));
        assert!(is_valid_resource_type("Observation"));

        assert!(!is_valid_resource_type("InvalidType"));
        assert!(!is_valid_resource_type(""));
        assert!(!is_valid_resource_type("patient"));
    }

    #[test]
    fn test_get_fhir_version() {
        assert_eq!(get_fhir_version(), "4.0.1");
    }
}
