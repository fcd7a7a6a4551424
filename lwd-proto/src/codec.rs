//! Raw block -> `CompactBlock` projection (spec.md §4.1).
//!
//! A raw block is a Zcash-style header followed by a compact-size tx count
//! and that many serialized transactions. Each transaction is parsed far
//! enough to recover its shielded descriptor lists and to compute its
//! txid (recomputed from the serialized-bytes range for v4, via the v5
//! hash tree in [`crate::txid`] for v5+).

use crate::cursor::Cursor;
use crate::error::ParseError;
use crate::txid::{
    self, HeaderFields, OrchardActionFields, OrchardFields, SaplingFields, SaplingOutputFields,
    SaplingSpendFields, TransparentFields,
};
use crate::types::{
    ChainMetadata, CompactBlock, CompactOrchardAction, CompactSaplingOutput, CompactSaplingSpend,
    CompactTx,
};
use sha2::{Digest, Sha256};

const MAX_SHIELDED_LIST_LEN: u64 = 1 << 16;
const OVERWINTER_FLAG: u32 = 1 << 31;
const SAPLING_VERSION_GROUP_ID: u32 = 0x892F_2085;
const ZIP225_VERSION_GROUP_ID: u32 = 0x26A7_270A;

/// Compact-projection of a block, plus the header's commitment-tree sizes
/// supplied by the caller (the raw block bytes alone don't carry these —
/// they come from the upstream node's verbose `getblock` response, per
/// spec.md §6).
pub fn parse<'a>(
    raw: &'a [u8],
    height: u64,
    chain_metadata: ChainMetadata,
) -> Result<(CompactBlock, &'a [u8]), ParseError> {
    let mut cur = Cursor::new(raw);
    let header_start = cur.position();
    let version = cur.read_i32()?;
    let prev_hash: [u8; 32] = cur.read_array()?;
    let _merkle_root: [u8; 32] = cur.read_array()?;
    let _final_sapling_root: [u8; 32] = cur.read_array()?;
    let time = cur.read_u32()?;
    let _bits: [u8; 4] = cur.read_array()?;
    let _nonce: [u8; 32] = cur.read_array()?;
    let _solution = cur.read_compact_bytes()?;
    let header_bytes = &raw[header_start..cur.position()];
    let hash = double_sha256(header_bytes);

    let tx_count = cur.read_compact_size()?;
    if tx_count > MAX_SHIELDED_LIST_LEN {
        return Err(ParseError::ImpossibleLength(format!(
            "block declares {tx_count} transactions"
        )));
    }

    let mut txs = Vec::new();
    for index in 0..tx_count {
        let tx_start = cur.position();
        let parsed = parse_transaction(&mut cur)?;
        let tx_bytes = &raw[tx_start..cur.position()];
        if let Some(compact) = parsed.into_compact(index, tx_bytes, version as u32) {
            txs.push(compact);
        }
    }

    let block = CompactBlock {
        height,
        hash: hash.to_vec(),
        prev_hash: prev_hash.to_vec(),
        time,
        chain_metadata: Some(chain_metadata),
        txs,
    };
    Ok((block, cur.remaining()))
}

fn double_sha256(data: &[u8]) -> [u8; 32] {
    let first = Sha256::digest(data);
    let second = Sha256::digest(first);
    let mut out = [0u8; 32];
    out.copy_from_slice(&second);
    out
}

struct ParsedTx {
    version_num: i32,
    version_group_id: Option<u32>,
    consensus_branch_id: Option<u32>,
    lock_time: u32,
    expiry_height: u32,
    transparent: TransparentParts,
    sapling: SaplingParts,
    orchard: OrchardParts,
}

#[derive(Default)]
struct TransparentParts {
    prevouts: Vec<[u8; 36]>,
    sequences: Vec<u32>,
    outputs: Vec<Vec<u8>>,
}

#[derive(Default)]
struct SaplingParts {
    spends: Vec<CompactSaplingSpend>,
    spend_fields: Vec<SaplingSpendFields>,
    outputs: Vec<CompactSaplingOutput>,
    output_fields: Vec<SaplingOutputFields>,
    value_balance: i64,
}

#[derive(Default)]
struct OrchardParts {
    actions: Vec<CompactOrchardAction>,
    action_fields: Vec<OrchardActionFields>,
    flags: u8,
    value_balance: i64,
    anchor: [u8; 32],
}

impl ParsedTx {
    fn is_shielded(&self) -> bool {
        !self.sapling.spends.is_empty()
            || !self.sapling.outputs.is_empty()
            || !self.orchard.actions.is_empty()
    }

    fn into_compact(self, index: u64, raw_bytes: &[u8], raw_version_field: u32) -> Option<CompactTx> {
        if !self.is_shielded() {
            return None;
        }
        let hash = if self.version_num >= 5 {
            let header = HeaderFields {
                version: raw_version_field as i32,
                version_group_id: self.version_group_id.unwrap_or(ZIP225_VERSION_GROUP_ID),
                consensus_branch_id: self.consensus_branch_id.unwrap_or(0),
                lock_time: self.lock_time,
                expiry_height: self.expiry_height,
            };
            let transparent = TransparentFields {
                prevouts: &self.transparent.prevouts,
                sequences: &self.transparent.sequences,
                outputs: &self.transparent.outputs,
            };
            let sapling = SaplingFields {
                spends: &self.sapling.spend_fields,
                outputs: &self.sapling.output_fields,
                value_balance: self.sapling.value_balance,
            };
            let orchard = OrchardFields {
                actions: &self.orchard.action_fields,
                flags: self.orchard.flags,
                value_balance: self.orchard.value_balance,
                anchor: self.orchard.anchor,
            };
            txid::txid_v5(&header, &transparent, &sapling, &orchard).to_vec()
        } else {
            double_sha256(raw_bytes).to_vec()
        };

        Some(CompactTx {
            index,
            hash,
            spends: self.sapling.spends,
            outputs: self.sapling.outputs,
            actions: self.orchard.actions,
        })
    }
}

fn parse_transaction(cur: &mut Cursor<'_>) -> Result<ParsedTx, ParseError> {
    let raw_version = cur.read_u32()?;
    let overwintered = raw_version & OVERWINTER_FLAG != 0;
    let version_num = (raw_version & !OVERWINTER_FLAG) as i32;

    if version_num < 4 && !overwintered {
        return Err(ParseError::MissingOverwinterFlag(version_num));
    }

    let (version_group_id, consensus_branch_id) = if overwintered {
        let vgid = cur.read_u32()?;
        if vgid != SAPLING_VERSION_GROUP_ID && vgid != ZIP225_VERSION_GROUP_ID {
            return Err(ParseError::UnknownVersionGroup(vgid));
        }
        let branch_id = if version_num >= 5 {
            Some(cur.read_u32()?)
        } else {
            None
        };
        (Some(vgid), branch_id)
    } else {
        (None, None)
    };

    let is_v5 = version_num >= 5;
    // ZIP-225 moves lock_time/expiry_height ahead of the transparent bundle;
    // pre-v5 overwintered transactions carry them after it. We normalize by
    // reading them in their v5 position first when applicable.
    let (mut lock_time, mut expiry_height) = (0u32, 0u32);
    if is_v5 {
        lock_time = cur.read_u32()?;
        expiry_height = cur.read_u32()?;
    }

    let transparent = parse_transparent(cur)?;

    if overwintered && !is_v5 {
        lock_time = cur.read_u32()?;
        expiry_height = cur.read_u32()?;
    } else if !overwintered {
        lock_time = cur.read_u32()?;
    }

    let sapling = parse_sapling(cur, overwintered, is_v5)?;
    let orchard = if is_v5 {
        parse_orchard(cur)?
    } else {
        OrchardParts::default()
    };

    Ok(ParsedTx {
        version_num,
        version_group_id,
        consensus_branch_id,
        lock_time,
        expiry_height,
        transparent,
        sapling,
        orchard,
    })
}

fn parse_transparent(cur: &mut Cursor<'_>) -> Result<TransparentParts, ParseError> {
    let in_count = cur.read_compact_size()?;
    check_list_len(in_count)?;
    let mut prevouts = Vec::with_capacity(in_count as usize);
    let mut sequences = Vec::with_capacity(in_count as usize);
    for _ in 0..in_count {
        let txid: [u8; 32] = cur.read_array()?;
        let vout = cur.read_u32()?;
        let mut prevout = [0u8; 36];
        prevout[..32].copy_from_slice(&txid);
        prevout[32..].copy_from_slice(&vout.to_le_bytes());
        let _script_sig = cur.read_compact_bytes()?;
        let sequence = cur.read_u32()?;
        prevouts.push(prevout);
        sequences.push(sequence);
    }

    let out_count = cur.read_compact_size()?;
    check_list_len(out_count)?;
    let mut outputs = Vec::with_capacity(out_count as usize);
    for _ in 0..out_count {
        let value = cur.read_i64()?;
        let script_pubkey = cur.read_compact_bytes()?;
        let mut buf = Vec::with_capacity(8 + script_pubkey.len());
        buf.extend_from_slice(&value.to_le_bytes());
        buf.extend_from_slice(script_pubkey);
        outputs.push(buf);
    }

    Ok(TransparentParts {
        prevouts,
        sequences,
        outputs,
    })
}

fn parse_sapling(
    cur: &mut Cursor<'_>,
    overwintered: bool,
    is_v5: bool,
) -> Result<SaplingParts, ParseError> {
    if !overwintered {
        return Ok(SaplingParts::default());
    }

    // valueBalanceSapling always precedes the spend/output arrays and is
    // always present once a transaction is Sapling-versioned, even with an
    // empty shielded bundle.
    let value_balance = cur.read_i64()?;

    let spend_count = cur.read_compact_size()?;
    check_list_len(spend_count)?;
    let mut spends = Vec::with_capacity(spend_count as usize);
    let mut spend_fields = Vec::with_capacity(spend_count as usize);
    for _ in 0..spend_count {
        let cv: [u8; 32] = cur.read_array()?;
        let anchor: [u8; 32] = cur.read_array()?;
        let nullifier: [u8; 32] = cur.read_array()?;
        let rk: [u8; 32] = cur.read_array()?;
        let _zkproof: [u8; 192] = cur.read_array()?;
        let _spend_auth_sig: [u8; 64] = cur.read_array()?;

        spend_fields.push(SaplingSpendFields {
            cv,
            anchor,
            nullifier,
            rk,
        });
        spends.push(CompactSaplingSpend {
            nullifier: nullifier.to_vec(),
        });
    }

    let output_count = cur.read_compact_size()?;
    check_list_len(output_count)?;
    let mut outputs = Vec::with_capacity(output_count as usize);
    let mut output_fields = Vec::with_capacity(output_count as usize);
    for _ in 0..output_count {
        // Field order is cv, cmu, ephemeral_key, enc_ciphertext,
        // out_ciphertext, zkproof — cv precedes cmu in the wire encoding.
        let cv: [u8; 32] = cur.read_array()?;
        let cmu: [u8; 32] = cur.read_array()?;
        let ephemeral_key: [u8; 32] = cur.read_array()?;
        let enc_ciphertext: [u8; 580] = cur.read_array()?;
        let out_ciphertext: [u8; 80] = cur.read_array()?;
        let _zkproof: [u8; 192] = cur.read_array()?;

        output_fields.push(SaplingOutputFields {
            cv,
            cmu,
            ephemeral_key,
            enc_ciphertext,
            out_ciphertext,
        });
        outputs.push(CompactSaplingOutput {
            note_commitment: cmu.to_vec(),
            ephemeral_key: ephemeral_key.to_vec(),
            ciphertext_prefix: enc_ciphertext[..52].to_vec(),
        });
    }

    // Sprout joinsplits were removed from the transaction format by ZIP-225;
    // v4 still carries the (by now always-empty) field.
    if !is_v5 {
        let joinsplit_count = cur.read_compact_size()?;
        if joinsplit_count != 0 {
            return Err(ParseError::InvalidData(
                "joinsplits are not supported by this parser".to_string(),
            ));
        }
    }

    if spend_count + output_count > 0 {
        let _binding_sig: [u8; 64] = cur.read_array()?;
    }

    Ok(SaplingParts {
        spends,
        spend_fields,
        outputs,
        output_fields,
        value_balance,
    })
}

fn parse_orchard(cur: &mut Cursor<'_>) -> Result<OrchardParts, ParseError> {
    let action_count = cur.read_compact_size()?;
    check_list_len(action_count)?;
    let mut actions = Vec::with_capacity(action_count as usize);
    let mut action_fields = Vec::with_capacity(action_count as usize);
    for _ in 0..action_count {
        let cv: [u8; 32] = cur.read_array()?;
        let nullifier: [u8; 32] = cur.read_array()?;
        let rk: [u8; 32] = cur.read_array()?;
        let cmx: [u8; 32] = cur.read_array()?;
        let ephemeral_key: [u8; 32] = cur.read_array()?;
        let enc_ciphertext: [u8; 580] = cur.read_array()?;
        let out_ciphertext: [u8; 80] = cur.read_array()?;

        action_fields.push(OrchardActionFields {
            cv,
            nullifier,
            rk,
            cmx,
            ephemeral_key,
            enc_ciphertext,
            out_ciphertext,
        });
        actions.push(CompactOrchardAction {
            nullifier: nullifier.to_vec(),
            commitment: cmx.to_vec(),
            ephemeral_key: ephemeral_key.to_vec(),
            ciphertext_prefix: enc_ciphertext[..52].to_vec(),
        });
    }

    let (flags, value_balance, anchor) = if action_count > 0 {
        let flags = cur.read_u8()?;
        let value_balance = cur.read_i64()?;
        let anchor: [u8; 32] = cur.read_array()?;
        let _proof = cur.read_compact_bytes()?;
        for _ in 0..action_count {
            let _spend_auth_sig: [u8; 64] = cur.read_array()?;
        }
        let _binding_sig: [u8; 64] = cur.read_array()?;
        (flags, value_balance, anchor)
    } else {
        (0, 0, [0u8; 32])
    };

    Ok(OrchardParts {
        actions,
        action_fields,
        flags,
        value_balance,
        anchor,
    })
}

fn check_list_len(n: u64) -> Result<(), ParseError> {
    if n > MAX_SHIELDED_LIST_LEN {
        Err(ParseError::ListTooLong(n as usize))
    } else {
        Ok(())
    }
}
