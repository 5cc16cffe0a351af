//! Built-in knowledge tables
//!
//! A curated eye-care billing subset. Deployments with their own tables load
//! them through [`KnowledgeBase::from_json`](super::KnowledgeBase::from_json).

use super::{
    CodeEntry, CodeSet, FieldGuidance, GuideEntry, GuideTopic, KnowledgeTables, TermEntry,
    VocabularyEntry,
};

fn term(term: &str, meaning: &str, explanation: &str, category: &str) -> TermEntry {
    TermEntry {
        term: term.to_string(),
        meaning: meaning.to_string(),
        explanation: explanation.to_string(),
        category: category.to_string(),
    }
}

fn code(code_set: CodeSet, code: &str, description: &str, specialties: &[&str]) -> CodeEntry {
    CodeEntry {
        code: code.to_string(),
        code_set,
        description: description.to_string(),
        specialties: specialties.iter().map(|s| s.to_string()).collect(),
    }
}

fn field(field: &str, label: &str, help: &str, example: Option<&str>) -> FieldGuidance {
    FieldGuidance {
        field: field.to_string(),
        label: label.to_string(),
        help: help.to_string(),
        example: example.map(str::to_string),
    }
}

fn vocab(surface: &str, normalized: &str) -> VocabularyEntry {
    VocabularyEntry {
        surface: surface.to_string(),
        normalized: normalized.to_string(),
    }
}

fn guide(
    topic: GuideTopic,
    title: &str,
    keywords: &[&str],
    body: &str,
    steps: &[&str],
) -> GuideEntry {
    GuideEntry {
        topic,
        title: title.to_string(),
        keywords: keywords.iter().map(|k| k.to_string()).collect(),
        body: body.to_string(),
        steps: steps.iter().map(|s| s.to_string()).collect(),
    }
}

#[rustfmt::skip]
pub(super) fn builtin_tables() -> KnowledgeTables {
    use CodeSet::*;

    KnowledgeTables {
        terms: vec![
            term("OD", "Right Eye", "Oculus dexter. Used when a procedure or finding applies to the right eye.", "anatomy"),
            term("OS", "Left Eye", "Oculus sinister. Used when a procedure or finding applies to the left eye.", "anatomy"),
            term("OU", "Both Eyes", "Oculus uterque. Used when a procedure or finding applies to both eyes.", "anatomy"),
            term("IOP", "Intraocular Pressure", "Fluid pressure inside the eye, measured in mmHg. Elevated IOP is a glaucoma risk factor.", "clinical"),
            term("VA", "Visual Acuity", "Clarity of vision, usually recorded as a Snellen fraction such as 20/40.", "clinical"),
            term("DR", "Diabetic Retinopathy", "Retinal damage caused by diabetes. Coded with ICD-10 E11.3x for type 2 diabetes.", "clinical"),
            term("AMD", "Age-related Macular Degeneration", "Degeneration of the macula in older patients. Coded in the ICD-10 H35.3x range.", "clinical"),
            term("OCT", "Optical Coherence Tomography", "Non-invasive cross-sectional imaging of the retina or optic nerve (CPT 92133/92134).", "procedure"),
            term("DOS", "Date of Service", "The date the service was rendered. Must match the encounter date on the claim.", "billing"),
            term("NPI", "National Provider Identifier", "A unique 10-digit number identifying a provider in HIPAA transactions.", "billing"),
            term("EOB", "Explanation of Benefits", "Statement from the payer describing what was covered and paid on a claim.", "billing"),
            term("ERA", "Electronic Remittance Advice", "Electronic version of the EOB (ANSI 835) used for automated payment posting.", "billing"),
            term("ABN", "Advance Beneficiary Notice", "Medicare form signed before a service that may not be covered, shifting liability to the patient.", "billing"),
            term("COB", "Coordination of Benefits", "Rules that decide which payer is primary when a patient has more than one plan.", "billing"),
            term("PA", "Prior Authorization", "Payer approval required before certain services are performed.", "billing"),
            term("DX", "Diagnosis", "The condition being treated, reported with ICD-10-CM codes.", "billing"),
            term("CPT", "Current Procedural Terminology", "Five-digit codes maintained by the AMA that describe procedures and services.", "coding"),
            term("ICD", "International Classification of Diseases", "ICD-10-CM codes describe diagnoses, e.g. E11.9 for type 2 diabetes without complications.", "coding"),
            term("HCPCS", "Healthcare Common Procedure Coding System", "Level II codes (a letter plus four digits) for supplies, drugs and services not in CPT.", "coding"),
            term("POS", "Place of Service", "Two-digit code identifying where the service was performed, e.g. 11 for office.", "coding"),
            term("NDC", "National Drug Code", "Identifier for drugs; required alongside J-codes for injectable medications.", "coding"),
            term("HbA1c", "Hemoglobin A1c", "Average blood glucose over roughly three months, used to monitor diabetes.", "clinical"),
            term("deductible", "Deductible", "Amount the patient pays each plan year before the insurer starts paying.", "insurance"),
            term("copay", "Copayment", "Fixed amount the patient pays at the time of service.", "insurance"),
            term("coinsurance", "Coinsurance", "Percentage of the allowed amount the patient pays after the deductible.", "insurance"),
        ],
        codes: vec![
            code(Cpt, "92002", "Ophthalmological exam, intermediate, new patient", &["ophthalmology"]),
            code(Cpt, "92004", "Ophthalmological exam, comprehensive, new patient", &["ophthalmology"]),
            code(Cpt, "92012", "Ophthalmological exam, intermediate, established patient", &["ophthalmology"]),
            code(Cpt, "92014", "Ophthalmological exam, comprehensive, established patient", &["ophthalmology"]),
            code(Cpt, "92020", "Gonioscopy", &["ophthalmology", "glaucoma"]),
            code(Cpt, "92083", "Visual field examination, extended", &["ophthalmology", "glaucoma"]),
            code(Cpt, "92133", "OCT, optic nerve", &["ophthalmology", "glaucoma"]),
            code(Cpt, "92134", "OCT, retina", &["ophthalmology", "diabetes"]),
            code(Cpt, "92228", "Remote retinal imaging with physician review", &["ophthalmology", "diabetes"]),
            code(Cpt, "92250", "Fundus photography with interpretation and report", &["ophthalmology", "diabetes"]),
            code(Cpt, "66984", "Cataract removal with intraocular lens insertion", &["ophthalmology", "surgery"]),
            code(Cpt, "67028", "Intravitreal injection of a pharmacologic agent", &["ophthalmology", "retina"]),
            code(Cpt, "99203", "Office visit, new patient, low complexity", &["evaluation_management"]),
            code(Cpt, "99204", "Office visit, new patient, moderate complexity", &["evaluation_management"]),
            code(Cpt, "99213", "Office visit, established patient, low complexity", &["evaluation_management"]),
            code(Cpt, "99214", "Office visit, established patient, moderate complexity", &["evaluation_management"]),
            code(Cpt, "83036", "Hemoglobin A1c test", &["diabetes", "laboratory"]),
            code(Icd10, "E11.9", "Type 2 diabetes mellitus without complications", &["diabetes"]),
            code(Icd10, "E11.319", "Type 2 diabetes with unspecified diabetic retinopathy without macular edema", &["diabetes", "ophthalmology"]),
            code(Icd10, "E11.359", "Type 2 diabetes with proliferative diabetic retinopathy without macular edema", &["diabetes", "ophthalmology"]),
            code(Icd10, "E10.9", "Type 1 diabetes mellitus without complications", &["diabetes"]),
            code(Icd10, "H40.10", "Unspecified open-angle glaucoma", &["ophthalmology", "glaucoma"]),
            code(Icd10, "H25.9", "Unspecified age-related cataract", &["ophthalmology"]),
            code(Icd10, "H35.30", "Unspecified macular degeneration", &["ophthalmology", "retina"]),
            code(Icd10, "H52.4", "Presbyopia", &["ophthalmology", "optical"]),
            code(Icd10, "I10", "Essential (primary) hypertension", &["cardiology"]),
            code(Icd10, "Z01.00", "Encounter for eye exam without abnormal findings", &["ophthalmology"]),
            code(Icd10, "Z79.4", "Long term (current) use of insulin", &["diabetes"]),
            code(Hcpcs, "G0117", "Glaucoma screening for high-risk patients by optometrist or ophthalmologist", &["ophthalmology", "glaucoma"]),
            code(Hcpcs, "J0178", "Injection, aflibercept, 1 mg", &["ophthalmology", "retina"]),
            code(Hcpcs, "S0620", "Routine ophthalmological exam including refraction, new patient", &["ophthalmology"]),
            code(Hcpcs, "V2020", "Frames, purchases", &["optical"]),
            code(Hcpcs, "V2100", "Sphere, single vision, plano to +/- 4.00d, per lens", &["optical"]),
            code(Pos, "02", "Telehealth provided other than in patient's home", &["telehealth"]),
            code(Pos, "10", "Telehealth provided in patient's home", &["telehealth"]),
            code(Pos, "11", "Office", &["general"]),
            code(Pos, "12", "Home", &["general"]),
            code(Pos, "21", "Inpatient hospital", &["hospital"]),
            code(Pos, "22", "On campus outpatient hospital", &["hospital"]),
            code(Pos, "24", "Ambulatory surgical center", &["surgery"]),
            code(Modifier, "25", "Significant, separately identifiable E/M service on the same day", &["general"]),
            code(Modifier, "26", "Professional component", &["general"]),
            code(Modifier, "50", "Bilateral procedure", &["general", "ophthalmology"]),
            code(Modifier, "59", "Distinct procedural service", &["general"]),
            code(Modifier, "GA", "Waiver of liability statement (ABN) on file", &["general"]),
            code(Modifier, "LT", "Left side", &["general", "ophthalmology"]),
            code(Modifier, "RT", "Right side", &["general", "ophthalmology"]),
            code(Modifier, "TC", "Technical component", &["general"]),
        ],
        fields: vec![
            field("diagnosis_code", "Diagnosis code", "Enter the ICD-10-CM code for the condition treated. Use the most specific code available and list the primary diagnosis first.", Some("E11.9")),
            field("procedure_code", "Procedure code", "Enter the CPT or HCPCS code for each service line. Each line needs at least one linked diagnosis pointer.", Some("92250")),
            field("place_of_service", "Place of service", "Two-digit POS code describing where the service was performed.", Some("11")),
            field("modifier", "Modifier", "Optional two-character modifiers that refine the procedure code, e.g. RT/LT for laterality or 25 for a separate E/M service.", Some("RT")),
            field("npi", "Rendering provider NPI", "The 10-digit National Provider Identifier of the provider who performed the service.", Some("1234567893")),
            field("date_of_service", "Date of service", "The encounter date in MM/DD/YYYY format. It cannot be in the future.", Some("03/14/2024")),
            field("patient_dob", "Patient date of birth", "Must match the payer's eligibility record exactly.", Some("07/02/1958")),
            field("insurance_id", "Insurance member ID", "Copy the member ID from the front of the insurance card, including any prefix letters.", Some("XYZ123456789")),
            field("prior_authorization", "Prior authorization number", "Enter the authorization number issued by the payer when the service requires approval.", None),
            field("units", "Units", "Number of times the service was performed. Bilateral procedures billed with modifier 50 use 1 unit.", Some("1")),
            field("charges", "Charges", "Billed amount for the line in dollars, before any adjustments.", Some("150.00")),
        ],
        conditions: vec![
            vocab("diabetic retinopathy", "diabetic retinopathy"),
            vocab("retinopathy", "diabetic retinopathy"),
            vocab("diabetes", "diabetes mellitus"),
            vocab("diabetic", "diabetes mellitus"),
            vocab("glaucoma", "glaucoma"),
            vocab("cataract", "cataract"),
            vocab("macular degeneration", "macular degeneration"),
            vocab("macular edema", "macular edema"),
            vocab("hypertension", "hypertension"),
            vocab("presbyopia", "presbyopia"),
        ],
        procedures: vec![
            vocab("fundus photography", "fundus photography"),
            vocab("fundus photo", "fundus photography"),
            vocab("retinal imaging", "retinal imaging"),
            vocab("optical coherence tomography", "optical coherence tomography"),
            vocab("visual field", "visual field examination"),
            vocab("gonioscopy", "gonioscopy"),
            vocab("eye exam", "eye examination"),
            vocab("dilated exam", "eye examination"),
            vocab("cataract surgery", "cataract surgery"),
            vocab("intravitreal injection", "intravitreal injection"),
            vocab("office visit", "office visit"),
            vocab("refraction", "refraction"),
        ],
        guides: builtin_guides(),
    }
}

fn builtin_guides() -> Vec<GuideEntry> {
    use GuideTopic::*;

    vec![
        guide(
            Provider,
            "Rendering vs billing provider",
            &["rendering", "billing provider", "provider", "physician", "doctor"],
            "The **rendering provider** is the clinician who performed the service; the **billing provider** is the practice or group that receives payment. Both need a valid NPI.",
            &[],
        ),
        guide(
            Provider,
            "Referring provider",
            &["referring", "referral", "referred"],
            "Enter the **referring provider** when another clinician sent the patient, for example a primary care physician referring a diabetic patient for a retinal exam. Medicare requires the referring NPI for many diagnostic tests.",
            &[],
        ),
        guide(
            Provider,
            "Provider identifiers",
            &["npi", "taxonomy", "identifier"],
            "Each provider has a 10-digit **NPI** and a **taxonomy code** describing their specialty (207W00000X for ophthalmology, 152W00000X for optometry).",
            &[],
        ),
        guide(
            Eligibility,
            "Verifying eligibility",
            &["eligib", "verify", "coverage", "covered", "active", "insurance"],
            "Verify eligibility before the visit so the claim is not denied for inactive coverage.",
            &[
                "Confirm the member ID and date of birth match the insurance card",
                "Check that coverage is active on the date of service",
                "Note whether routine vision or only medical eye care is covered",
                "Record any prior authorization requirements",
            ],
        ),
        guide(
            Eligibility,
            "Patient responsibility",
            &["deductible", "copay", "coinsurance", "out of pocket", "owe"],
            "Patient responsibility is the **deductible** remaining for the plan year, plus the **copay** or **coinsurance** for the visit. The EOB shows the final split after adjudication.",
            &[],
        ),
        guide(
            Claims,
            "Claim denials",
            &["denied", "denial", "rejected", "rejection"],
            "Start from the denial reason (CARC/RARC) on the EOB or ERA. Common causes are an invalid diagnosis pointer, a missing modifier, or inactive coverage.",
            &[
                "Read the reason code on the remittance",
                "Correct the claim data (codes, modifiers, patient details)",
                "Resubmit a corrected claim or file an appeal within the payer's deadline",
            ],
        ),
        guide(
            Claims,
            "Appeals",
            &["appeal", "reconsideration", "redetermination"],
            "File an **appeal** when a denial is incorrect. Include the original claim, the denial notice and supporting documentation such as exam notes.",
            &[],
        ),
        guide(
            Claims,
            "Submitting a claim",
            &["submit", "claim", "send", "file"],
            "Claims are submitted electronically as an 837P. Each service line needs a procedure code, at least one linked diagnosis and the charge amount.",
            &[],
        ),
        guide(
            Claims,
            "Payments and remittance",
            &["payment", "paid", "reimbursement", "remittance", "eob"],
            "Payments arrive with an **ERA** (835) or paper **EOB** listing the allowed amount, adjustments and patient responsibility per line.",
            &[],
        ),
        guide(
            Workflow,
            "Completing a billing form",
            &["how do i", "fill out", "complete", "start", "workflow", "process", "steps"],
            "Work through the form top to bottom; each step validates before you continue.",
            &[
                "Patient: name, date of birth and insurance member ID",
                "Encounter: date of service and place of service",
                "Diagnoses: ICD-10 codes, primary first",
                "Services: CPT/HCPCS codes, modifiers, units and charges",
                "Review and submit",
            ],
        ),
        guide(
            Workflow,
            "Fixing validation errors",
            &["error", "invalid", "validation", "required"],
            "Fields with a red outline failed validation. Hover over the field for the specific rule, for example a future date of service or a diagnosis code without enough characters.",
            &[],
        ),
        guide(
            Workflow,
            "Saving progress",
            &["save", "draft", "resume", "later"],
            "Use **Save draft** to keep a partially completed form. Drafts are kept per user and can be resumed from the dashboard.",
            &[],
        ),
        guide(
            Mobile,
            "Voice input",
            &["voice", "dictate", "speak", "microphone"],
            "Tap the microphone icon next to a field to dictate its value. Codes can be spoken digit by digit, for example \"E eleven point nine\".",
            &[],
        ),
        guide(
            Mobile,
            "Gestures",
            &["swipe", "gesture", "tap", "pinch"],
            "Swipe left or right to move between form steps, and long-press a field to open its help.",
            &[],
        ),
        guide(
            Mobile,
            "Scanning insurance cards",
            &["camera", "scan", "photo", "card"],
            "Use **Scan card** to photograph the front and back of an insurance card; the member ID and payer are filled in automatically for you to confirm.",
            &[],
        ),
        guide(
            Mobile,
            "Working offline",
            &["offline", "sync", "connection", "phone", "tablet", "mobile"],
            "Forms can be completed offline on a phone or tablet. Changes sync when the device reconnects; code lookups keep working from the built-in tables.",
            &[],
        ),
    ]
}
