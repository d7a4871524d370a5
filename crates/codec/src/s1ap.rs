//! S1AP PDU decoding (3GPP TS 36.413, aligned PER).
//!
//! The generic walk produces a map of IE name to lowercase-hex value;
//! specific extractors then pull S1AP ids, ECGI and the S-TMSI out of that
//! map. Decoding is tolerant: truncation at any point keeps the IEs parsed
//! so far.

use std::collections::BTreeMap;

use s1scope_core::hex;

use crate::per;

/// S1AP-PDU CHOICE alternatives.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PduType {
    InitiatingMessage,
    SuccessfulOutcome,
    UnsuccessfulOutcome,
}

impl PduType {
    pub fn as_index(self) -> u8 {
        match self {
            PduType::InitiatingMessage => 0,
            PduType::SuccessfulOutcome => 1,
            PduType::UnsuccessfulOutcome => 2,
        }
    }
}

/// Generic decode of one S1AP PDU.
#[derive(Debug, Clone)]
pub struct S1apPdu {
    pub pdu_type: PduType,
    pub procedure_code: u8,
    /// IE name -> lowercase hex value. BTreeMap keeps renderings stable.
    pub ies: BTreeMap<String, String>,
}

/// Decode the outer S1AP PDU structure.
///
/// Layout: CHOICE index in the top bits of byte 0, procedure code byte,
/// criticality byte, OPEN TYPE length determinant, one SEQUENCE preamble
/// byte, 2-byte big-endian protocolIEs count, then per entry: 2-byte IE id,
/// 1-byte criticality, length determinant, value bytes.
///
/// Returns `None` only when the buffer is too short to classify the PDU.
pub fn parse_pdu(bytes: &[u8]) -> Option<S1apPdu> {
    if bytes.len() < 2 {
        return None;
    }

    let pdu_type = match (bytes[0] >> 5) & 0x03 {
        0 => PduType::InitiatingMessage,
        1 => PduType::SuccessfulOutcome,
        2 => PduType::UnsuccessfulOutcome,
        _ => return None,
    };

    let mut pdu = S1apPdu {
        pdu_type,
        procedure_code: bytes[1],
        ies: BTreeMap::new(),
    };

    // Criticality byte, then the message value as an OPEN TYPE.
    let mut offset = 3;
    let Some((_value_len, consumed)) = per::read_length(bytes, offset) else {
        return Some(pdu);
    };
    offset += consumed;

    // SEQUENCE preamble (extension + optional bitmap), then the IE count.
    offset += 1;
    if offset + 2 > bytes.len() {
        return Some(pdu);
    }
    let num_ies = u16::from_be_bytes([bytes[offset], bytes[offset + 1]]) as usize;
    offset += 2;

    for _ in 0..num_ies {
        if offset + 2 > bytes.len() {
            break;
        }
        let ie_id = u16::from_be_bytes([bytes[offset], bytes[offset + 1]]);
        offset += 2;

        // IE criticality.
        if offset >= bytes.len() {
            break;
        }
        offset += 1;

        let Some((value_len, consumed)) = per::read_length(bytes, offset) else {
            break;
        };
        offset += consumed;
        if offset + value_len > bytes.len() {
            break;
        }

        pdu.ies.insert(
            ie_name(ie_id),
            hex::encode(&bytes[offset..offset + value_len]),
        );
        offset += value_len;
    }

    Some(pdu)
}

/// ProtocolIE-ID to IE name (3GPP TS 36.413 §9.3.3).
pub fn ie_name(ie_id: u16) -> String {
    let name = match ie_id {
        0 => "MME-UE-S1AP-ID",
        1 => "HandoverType",
        2 => "Cause",
        3 => "SourceID",
        4 => "TargetID",
        8 => "eNB-UE-S1AP-ID",
        12 => "E-RABSubjecttoDataForwardingList",
        13 => "E-RABtoReleaseListHOCmd",
        14 => "E-RABDataForwardingItem",
        15 => "E-RABReleaseItemBearerRelComp",
        16 => "E-RABToBeSetupListBearerSUReq",
        17 => "E-RABToBeSetupItemBearerSUReq",
        18 => "E-RABAdmittedList",
        19 => "E-RABFailedToSetupListHOReqAck",
        20 => "E-RABAdmittedItem",
        21 => "E-RABFailedtoSetupItemHOReqAck",
        22 => "E-RABToBeSwitchedDLList",
        23 => "E-RABToBeSwitchedDLItem",
        24 => "E-RABToBeSetupListCtxtSUReq",
        25 => "TraceActivation",
        26 => "NAS-PDU",
        27 => "E-RABToBeSetupItemHOReq",
        28 => "E-RABSetupListBearerSURes",
        29 => "E-RABFailedToSetupListBearerSURes",
        30 => "E-RABToBeModifiedListBearerModReq",
        31 => "E-RABModifyListBearerModRes",
        32 => "E-RABFailedToModifyList",
        33 => "E-RABToBeReleasedList",
        34 => "E-RABFailedToReleaseList",
        35 => "E-RABItem",
        36 => "E-RABToBeModifiedItemBearerModReq",
        37 => "E-RABModifyItemBearerModRes",
        38 => "E-RABReleaseItem",
        39 => "E-RABSetupItemBearerSURes",
        40 => "SecurityContext",
        41 => "HandoverRestrictionList",
        43 => "UEPagingID",
        44 => "pagingDRX",
        46 => "TAIList",
        47 => "TAIItem",
        48 => "E-RABFailedToSetupListCtxtSURes",
        49 => "E-RABReleaseItemHOCmd",
        50 => "E-RABSetupItemCtxtSURes",
        51 => "E-RABSetupListCtxtSURes",
        52 => "E-RABToBeSetupItemCtxtSUReq",
        53 => "E-RABToBeSetupListHOReq",
        55 => "GERANtoLTEHOInformationRes",
        57 => "UTRANtoLTEHOInformationRes",
        58 => "CriticalityDiagnostics",
        59 => "Global-ENB-ID",
        60 => "eNBname",
        61 => "MMEname",
        63 => "ServedPLMNs",
        64 => "SupportedTAs",
        65 => "TimeToWait",
        66 => "uEaggregateMaximumBitrate",
        67 => "TAI",
        69 => "E-RABReleaseListBearerRelComp",
        70 => "cdma2000PDU",
        71 => "cdma2000RATType",
        72 => "cdma2000SectorID",
        73 => "SecurityKey",
        74 => "UERadioCapability",
        75 => "GUMMEI-ID",
        78 => "E-RABInformationListItem",
        79 => "Direct-Forwarding-Path-Availability",
        80 => "UEIdentityIndexValue",
        83 => "cdma2000HOStatus",
        84 => "cdma2000HORequiredIndication",
        86 => "E-UTRAN-Trace-ID",
        87 => "RelativeMMECapacity",
        88 => "SourceMME-UE-S1AP-ID",
        89 => "Bearers-SubjectToStatusTransfer-Item",
        90 => "eNB-StatusTransfer-TransparentContainer",
        91 => "UE-associatedLogicalS1-ConnectionItem",
        92 => "ResetType",
        93 => "UE-associatedLogicalS1-ConnectionListResAck",
        94 => "E-RABToBeSwitchedULItem",
        95 => "E-RABToBeSwitchedULList",
        96 => "S-TMSI",
        97 => "cdma2000OneXRAND",
        98 => "RequestType",
        99 => "UE-S1AP-IDs",
        100 => "EUTRAN-CGI",
        101 => "OverloadResponse",
        102 => "cdma2000OneXSRVCCInfo",
        103 => "E-RABFailedToBeReleasedList",
        104 => "Source-ToTarget-TransparentContainer",
        105 => "ServedGUMMEIs",
        106 => "SubscriberProfileIDforRFP",
        107 => "UESecurityCapabilities",
        108 => "CSFallbackIndicator",
        109 => "CNDomain",
        110 => "E-RABReleasedList",
        111 => "MessageIdentifier",
        112 => "SerialNumber",
        113 => "WarningAreaList",
        114 => "RepetitionPeriod",
        115 => "NumberofBroadcastRequest",
        116 => "WarningType",
        117 => "WarningSecurityInfo",
        118 => "DataCodingScheme",
        119 => "WarningMessageContents",
        120 => "BroadcastCompletedAreaList",
        121 => "Inter-SystemInformationTransferTypeEDT",
        122 => "Inter-SystemInformationTransferTypeMDT",
        123 => "Target-ToSource-TransparentContainer",
        124 => "SRVCCOperationPossible",
        125 => "SRVCCHOIndication",
        126 => "NAS-DownlinkCount",
        127 => "CSG-Id",
        128 => "CSG-IdList",
        129 => "SONConfigurationTransferECT",
        130 => "SONConfigurationTransferMCT",
        131 => "TraceCollectionEntityIPAddress",
        132 => "MSClassmark2",
        133 => "MSClassmark3",
        134 => "RRC-Establishment-Cause",
        135 => "NASSecurityParametersfromE-UTRAN",
        136 => "NASSecurityParameterstoE-UTRAN",
        137 => "DefaultPagingDRX",
        138 => "Source-ToTarget-TransparentContainer-Secondary",
        139 => "Target-ToSource-TransparentContainer-Secondary",
        140 => "EUTRANRoundTripDelayEstimationInfo",
        141 => "BroadcastCancelledAreaList",
        142 => "ConcurrentWarningMessageIndicator",
        143 => "Data-Forwarding-Not-Possible",
        144 => "ExtendedRepetitionPeriod",
        145 => "CellAccessMode",
        146 => "CSGMembershipStatus",
        147 => "LPPa-PDU",
        148 => "Routing-ID",
        149 => "Time-Synchronization-Info",
        150 => "PS-ServiceNotAvailable",
        151 => "PagingPriority",
        152 => "x2TNLConfigurationInfo",
        153 => "eNBX2ExtendedTransportLayerAddresses",
        154 => "GUMMEIList",
        155 => "GW-TransportLayerAddress",
        156 => "Correlation-ID",
        157 => "SourceMME-GUMMEI",
        158 => "MME-UE-S1AP-ID-2",
        159 => "RegisteredLAI",
        160 => "RelayNode-Indicator",
        161 => "TrafficLoadReductionIndication",
        162 => "MDTConfiguration",
        163 => "MMERelaySupportIndicator",
        164 => "GWContextReleaseIndication",
        165 => "ManagementBasedMDTAllowed",
        _ => return format!("IE_{}", ie_id),
    };
    name.to_string()
}

/// Procedure code to procedure name (3GPP TS 36.413 §8).
pub fn procedure_name(procedure_code: u8) -> &'static str {
    match procedure_code {
        0 => "HandoverPreparation",
        1 => "HandoverResourceAllocation",
        2 => "HandoverNotification",
        3 => "PathSwitchRequest",
        4 => "HandoverCancel",
        5 => "E-RABSetup",
        6 => "E-RABModify",
        7 => "E-RABRelease",
        8 => "E-RABReleaseIndication",
        9 => "InitialContextSetup",
        10 => "Paging",
        11 => "downlinkNASTransport",
        12 => "initialUEMessage",
        13 => "uplinkNASTransport",
        14 => "Reset",
        15 => "ErrorIndication",
        16 => "NASNonDeliveryIndication",
        17 => "S1Setup",
        18 => "UEContextReleaseRequest",
        19 => "DownlinkS1cdma2000tunneling",
        20 => "UplinkS1cdma2000tunneling",
        21 => "UEContextModification",
        22 => "UECapabilityInfoIndication",
        23 => "UEContextRelease",
        24 => "eNBStatusTransfer",
        25 => "MMEStatusTransfer",
        26 => "DeactivateTrace",
        27 => "TraceStart",
        28 => "TraceFailureIndication",
        29 => "ENBConfigurationUpdate",
        30 => "MMEConfigurationUpdate",
        31 => "LocationReportingControl",
        32 => "LocationReportingFailureIndication",
        33 => "LocationReport",
        34 => "OverloadStart",
        35 => "OverloadStop",
        36 => "WriteReplaceWarning",
        37 => "eNBDirectInformationTransfer",
        38 => "MMEDirectInformationTransfer",
        39 => "PrivateMessage",
        40 => "eNBConfigurationTransfer",
        41 => "MMEConfigurationTransfer",
        42 => "CellTrafficTrace",
        43 => "Kill",
        44 => "downlinkUEAssociatedLPPaTransport",
        45 => "uplinkUEAssociatedLPPaTransport",
        46 => "downlinkNonUEAssociatedLPPaTransport",
        47 => "uplinkNonUEAssociatedLPPaTransport",
        _ => "Unknown",
    }
}

/// Canonical message type name for (procedure code, PDU type).
///
/// These strings are the sink-observable vocabulary that rules match on,
/// including the lowercase `initialUEMessage`.
pub fn msg_type(procedure_code: u8, pdu_type: PduType) -> String {
    use PduType::*;
    let name = match (procedure_code, pdu_type) {
        (0, InitiatingMessage) => "HandoverRequired",
        (0, SuccessfulOutcome) => "HandoverCommand",
        (0, UnsuccessfulOutcome) => "HandoverPreparationFailure",
        (1, InitiatingMessage) => "HandoverRequest",
        (1, SuccessfulOutcome) => "HandoverRequestAcknowledge",
        (1, UnsuccessfulOutcome) => "HandoverFailure",
        (2, InitiatingMessage) => "HandoverNotify",
        (3, InitiatingMessage) => "PathSwitchRequest",
        (3, SuccessfulOutcome) => "PathSwitchRequestAcknowledge",
        (3, UnsuccessfulOutcome) => "PathSwitchRequestFailure",
        (4, InitiatingMessage) => "HandoverCancel",
        (4, SuccessfulOutcome) => "HandoverCancelAcknowledge",
        (5, InitiatingMessage) => "E-RABSetupRequest",
        (5, SuccessfulOutcome) => "E-RABSetupResponse",
        (6, InitiatingMessage) => "E-RABModifyRequest",
        (6, SuccessfulOutcome) => "E-RABModifyResponse",
        (7, InitiatingMessage) => "E-RABReleaseCommand",
        (7, SuccessfulOutcome) => "E-RABReleaseResponse",
        (8, InitiatingMessage) => "E-RABReleaseIndication",
        (9, InitiatingMessage) => "InitialContextSetupRequest",
        (9, SuccessfulOutcome) => "InitialContextSetupResponse",
        (9, UnsuccessfulOutcome) => "InitialContextSetupFailure",
        (10, InitiatingMessage) => "Paging",
        (11, InitiatingMessage) => "DownlinkNASTransport",
        (12, InitiatingMessage) => "initialUEMessage",
        (13, InitiatingMessage) => "UplinkNASTransport",
        (14, InitiatingMessage) => "Reset",
        (14, SuccessfulOutcome) => "ResetAcknowledge",
        (15, InitiatingMessage) => "ErrorIndication",
        (16, InitiatingMessage) => "NASNonDeliveryIndication",
        (17, InitiatingMessage) => "S1SetupRequest",
        (17, SuccessfulOutcome) => "S1SetupResponse",
        (17, UnsuccessfulOutcome) => "S1SetupFailure",
        (18, InitiatingMessage) => "UEContextReleaseRequest",
        (19, InitiatingMessage) => "DownlinkS1cdma2000tunneling",
        (20, InitiatingMessage) => "UplinkS1cdma2000tunneling",
        (21, InitiatingMessage) => "UEContextModificationRequest",
        (21, SuccessfulOutcome) => "UEContextModificationResponse",
        (21, UnsuccessfulOutcome) => "UEContextModificationFailure",
        (22, InitiatingMessage) => "UECapabilityInfoIndication",
        (23, InitiatingMessage) => "UEContextReleaseCommand",
        (23, SuccessfulOutcome) => "UEContextReleaseComplete",
        (24, InitiatingMessage) => "ENBStatusTransfer",
        (25, InitiatingMessage) => "MMEStatusTransfer",
        (26, InitiatingMessage) => "DeactivateTrace",
        (27, InitiatingMessage) => "TraceStart",
        (28, InitiatingMessage) => "TraceFailureIndication",
        (29, InitiatingMessage) => "ENBConfigurationUpdate",
        (29, SuccessfulOutcome) => "ENBConfigurationUpdateAcknowledge",
        (29, UnsuccessfulOutcome) => "ENBConfigurationUpdateFailure",
        (30, InitiatingMessage) => "MMEConfigurationUpdate",
        (30, SuccessfulOutcome) => "MMEConfigurationUpdateAcknowledge",
        (30, UnsuccessfulOutcome) => "MMEConfigurationUpdateFailure",
        (31, InitiatingMessage) => "LocationReportingControl",
        (32, InitiatingMessage) => "LocationReportingFailureIndication",
        (33, InitiatingMessage) => "LocationReport",
        (34, InitiatingMessage) => "OverloadStart",
        (35, InitiatingMessage) => "OverloadStop",
        (36, InitiatingMessage) => "WriteReplaceWarningRequest",
        (36, SuccessfulOutcome) => "WriteReplaceWarningResponse",
        (37, InitiatingMessage) => "ENBDirectInformationTransfer",
        (38, InitiatingMessage) => "MMEDirectInformationTransfer",
        (39, InitiatingMessage) => "PrivateMessage",
        (40, InitiatingMessage) => "ENBConfigurationTransfer",
        (41, InitiatingMessage) => "MMEConfigurationTransfer",
        (42, InitiatingMessage) => "CellTrafficTrace",
        (43, InitiatingMessage) => "KillRequest",
        (43, SuccessfulOutcome) => "KillResponse",
        (44, InitiatingMessage) => "DownlinkUEAssociatedLPPaTransport",
        (45, InitiatingMessage) => "UplinkUEAssociatedLPPaTransport",
        (46, InitiatingMessage) => "DownlinkNonUEAssociatedLPPaTransport",
        (47, InitiatingMessage) => "UplinkNonUEAssociatedLPPaTransport",
        _ => return procedure_name(procedure_code).to_string(),
    };
    name.to_string()
}

/// Extract the MME and eNB UE S1AP ids from the IE map.
///
/// The combined UE-S1AP-IDs IE (8 bytes: MME id then eNB id, both
/// big-endian) takes precedence; otherwise the individual id IEs are parsed
/// as big-endian hex.
pub fn extract_s1ap_ids(ies: &BTreeMap<String, String>) -> (Option<u32>, Option<u32>) {
    let mut mme_id = None;
    let mut enb_id = None;

    if let Some(combined) = ies.get("UE-S1AP-IDs") {
        let bytes = hex::decode(combined);
        if bytes.len() >= 8 {
            mme_id = per::read_u32_be(&bytes, 0);
            enb_id = per::read_u32_be(&bytes, 4);
        }
    }

    if mme_id.is_none() {
        mme_id = ies.get("MME-UE-S1AP-ID").and_then(|v| hex::parse_u32(v));
    }
    if enb_id.is_none() {
        enb_id = ies.get("eNB-UE-S1AP-ID").and_then(|v| hex::parse_u32(v));
    }

    (mme_id, enb_id)
}

/// EUTRAN-CGI components: raw bytes, 3-byte PLMN identity, cell identity.
pub struct Ecgi {
    pub raw: Vec<u8>,
    pub plmn_identity: Vec<u8>,
    pub cell_id: Vec<u8>,
}

fn split_ecgi(bytes: Vec<u8>) -> Option<Ecgi> {
    if bytes.is_empty() {
        return None;
    }
    let plmn_identity = if bytes.len() >= 3 {
        bytes[..3].to_vec()
    } else {
        Vec::new()
    };
    let cell_id = if bytes.len() >= 7 {
        bytes[3..7].to_vec()
    } else if bytes.len() > 3 {
        bytes[3..].to_vec()
    } else {
        Vec::new()
    };
    Some(Ecgi {
        raw: bytes,
        plmn_identity,
        cell_id,
    })
}

/// ECGI from the EUTRAN-CGI IE: 3-byte PLMN (TBCD) + 28-bit cell identity
/// right-padded to 4 bytes.
pub fn extract_ecgi(ies: &BTreeMap<String, String>) -> Option<Ecgi> {
    ies.get("EUTRAN-CGI").and_then(|v| split_ecgi(hex::decode(v)))
}

/// Target-cell ECGI for handover messages: any IE whose name mentions both
/// a target and a CGI, parsed the same way.
pub fn extract_target_ecgi(ies: &BTreeMap<String, String>) -> Option<Ecgi> {
    for (name, value) in ies {
        let targetish = name.contains("target") || name.contains("Target");
        let cgiish = name.contains("CGI") || name.contains("cgi");
        if targetish && cgiish {
            return split_ecgi(hex::decode(value));
        }
    }
    None
}

/// m-TMSI from the S-TMSI IE: 1 byte mMEC followed by the 4-byte m-TMSI.
pub fn extract_tmsi_from_stmsi(ies: &BTreeMap<String, String>) -> Option<String> {
    let value = ies.get("S-TMSI")?;
    // At least 5 bytes of hex; the last 4 bytes are the m-TMSI.
    if value.len() < 10 {
        return None;
    }
    let m_tmsi = value[value.len() - 8..].to_ascii_lowercase();
    if m_tmsi.chars().all(|c| c.is_ascii_hexdigit()) {
        Some(m_tmsi)
    } else {
        None
    }
}

/// NAS message bytes from the NAS-PDU IE. The OCTET STRING carries its own
/// length determinant ahead of the payload.
pub fn extract_nas_pdu(ies: &BTreeMap<String, String>) -> Option<Vec<u8>> {
    let bytes = hex::decode(ies.get("NAS-PDU")?);
    let (len, consumed) = per::read_length(&bytes, 0)?;
    let start = consumed;
    let end = start.checked_add(len)?;
    if end > bytes.len() {
        // Tolerate a short determinant by taking what is there.
        return Some(bytes[start..].to_vec());
    }
    Some(bytes[start..end].to_vec())
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Assemble an S1AP PDU from IE triples, the way the encoder on the
    /// wire would.
    pub(crate) fn build_pdu(pdu_index: u8, procedure: u8, ies: &[(u16, &[u8])]) -> Vec<u8> {
        let mut body = vec![0x00]; // SEQUENCE preamble
        body.extend_from_slice(&(ies.len() as u16).to_be_bytes());
        for (id, value) in ies {
            body.extend_from_slice(&id.to_be_bytes());
            body.push(0x40); // criticality: ignore
            assert!(value.len() < 128, "test IEs use short-form lengths");
            body.push(value.len() as u8);
            body.extend_from_slice(value);
        }

        let mut pdu = vec![pdu_index << 5, procedure, 0x00];
        if body.len() < 128 {
            pdu.push(body.len() as u8);
        } else {
            pdu.push(0x80 | ((body.len() >> 8) as u8));
            pdu.push((body.len() & 0xff) as u8);
        }
        pdu.extend_from_slice(&body);
        pdu
    }

    #[test]
    fn parses_choice_and_procedure() {
        let bytes = build_pdu(1, 23, &[]);
        let pdu = parse_pdu(&bytes).unwrap();
        assert_eq!(pdu.pdu_type, PduType::SuccessfulOutcome);
        assert_eq!(pdu.procedure_code, 23);
        assert!(pdu.ies.is_empty());
    }

    #[test]
    fn rejects_invalid_choice() {
        assert!(parse_pdu(&[0x60, 0x00]).is_none());
        assert!(parse_pdu(&[]).is_none());
    }

    #[test]
    fn decodes_ies_into_hex_map() {
        let bytes = build_pdu(0, 12, &[(0, &[0x00, 0x00, 0x00, 0x4d]), (8, &[0x00, 0x01, 0x02])]);
        let pdu = parse_pdu(&bytes).unwrap();
        assert_eq!(pdu.ies["MME-UE-S1AP-ID"], "0000004d");
        assert_eq!(pdu.ies["eNB-UE-S1AP-ID"], "000102");
    }

    #[test]
    fn unknown_ie_id_gets_numeric_name() {
        let bytes = build_pdu(0, 12, &[(500, &[0x01])]);
        let pdu = parse_pdu(&bytes).unwrap();
        assert_eq!(pdu.ies["IE_500"], "01");
    }

    #[test]
    fn truncated_ie_keeps_earlier_ies() {
        let mut bytes = build_pdu(0, 12, &[(0, &[0x00, 0x00, 0x00, 0x01])]);
        // Claim 2 IEs but only one is present.
        let count_pos = 5;
        bytes[count_pos + 1] = 2;
        let pdu = parse_pdu(&bytes).unwrap();
        assert_eq!(pdu.ies.len(), 1);
    }

    #[test]
    fn combined_ue_s1ap_ids_win() {
        let mut ies = BTreeMap::new();
        ies.insert(
            "UE-S1AP-IDs".to_string(),
            "000000070000002a".to_string(),
        );
        ies.insert("MME-UE-S1AP-ID".to_string(), "ff".to_string());
        let (mme, enb) = extract_s1ap_ids(&ies);
        assert_eq!(mme, Some(7));
        assert_eq!(enb, Some(42));
    }

    #[test]
    fn individual_id_ies() {
        let mut ies = BTreeMap::new();
        ies.insert("MME-UE-S1AP-ID".to_string(), "0000004d".to_string());
        ies.insert("eNB-UE-S1AP-ID".to_string(), "0102".to_string());
        let (mme, enb) = extract_s1ap_ids(&ies);
        assert_eq!(mme, Some(77));
        assert_eq!(enb, Some(0x0102));
    }

    #[test]
    fn ecgi_split() {
        let mut ies = BTreeMap::new();
        ies.insert("EUTRAN-CGI".to_string(), "112233aabbcccd".to_string());
        let ecgi = extract_ecgi(&ies).unwrap();
        assert_eq!(ecgi.raw, vec![0x11, 0x22, 0x33, 0xaa, 0xbb, 0xcc, 0xcd]);
        assert_eq!(ecgi.plmn_identity, vec![0x11, 0x22, 0x33]);
        assert_eq!(ecgi.cell_id, vec![0xaa, 0xbb, 0xcc, 0xcd]);
    }

    #[test]
    fn target_ecgi_by_name_scan() {
        let mut ies = BTreeMap::new();
        ies.insert("Target-CGI".to_string(), "445566ddeeff01".to_string());
        let ecgi = extract_target_ecgi(&ies).unwrap();
        assert_eq!(ecgi.plmn_identity, vec![0x44, 0x55, 0x66]);
    }

    #[test]
    fn stmsi_yields_m_tmsi() {
        let mut ies = BTreeMap::new();
        ies.insert("S-TMSI".to_string(), "00deadbeef".to_string());
        assert_eq!(extract_tmsi_from_stmsi(&ies).as_deref(), Some("deadbeef"));

        ies.insert("S-TMSI".to_string(), "00de".to_string());
        assert_eq!(extract_tmsi_from_stmsi(&ies), None);
    }

    #[test]
    fn nas_pdu_strips_length_determinant() {
        let mut ies = BTreeMap::new();
        ies.insert("NAS-PDU".to_string(), "0307410c".to_string());
        assert_eq!(extract_nas_pdu(&ies), Some(vec![0x07, 0x41, 0x0c]));
    }

    #[test]
    fn msg_type_table_spot_checks() {
        assert_eq!(msg_type(1, PduType::InitiatingMessage), "HandoverRequest");
        assert_eq!(
            msg_type(1, PduType::SuccessfulOutcome),
            "HandoverRequestAcknowledge"
        );
        assert_eq!(msg_type(2, PduType::InitiatingMessage), "HandoverNotify");
        assert_eq!(msg_type(12, PduType::InitiatingMessage), "initialUEMessage");
        assert_eq!(
            msg_type(23, PduType::SuccessfulOutcome),
            "UEContextReleaseComplete"
        );
        assert_eq!(
            msg_type(9, PduType::InitiatingMessage),
            "InitialContextSetupRequest"
        );
        // Procedures without a specific outcome mapping fall back.
        assert_eq!(msg_type(10, PduType::SuccessfulOutcome), "Paging");
    }
}
