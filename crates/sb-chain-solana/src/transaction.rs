//! Legacy (pre-v0) Solana transaction encoding for a single System Program transfer.

pub const SYSTEM_PROGRAM_ID: [u8; 32] = [0; 32];

const SYSTEM_TRANSFER_INSTRUCTION: u32 = 2;
const SIGNATURE_LEN: usize = 64;

pub fn encode_compact_u16(value: u16, out: &mut Vec<u8>) {
    let mut remaining = value;
    loop {
        let byte = (remaining & 0x7f) as u8;
        remaining >>= 7;
        if remaining == 0 {
            out.push(byte);
            return;
        }
        out.push(byte | 0x80);
    }
}

/// Returns the decoded value and the number of bytes consumed.
pub fn decode_compact_u16(input: &[u8]) -> Option<(u16, usize)> {
    let mut value: u32 = 0;
    for (index, byte) in input.iter().take(3).enumerate() {
        value |= u32::from(byte & 0x7f) << (7 * index);
        if byte & 0x80 == 0 {
            return u16::try_from(value).ok().map(|value| (value, index + 1));
        }
    }
    None
}

/// Message bytes that the fee payer signs.
///
/// Account order: `[from (writable signer), to (writable), system program (readonly)]`.
pub fn transfer_message(
    from: &[u8; 32],
    to: &[u8; 32],
    lamports: u64,
    recent_blockhash: &[u8; 32],
) -> Vec<u8> {
    let mut message = Vec::with_capacity(150);

    // header: required signatures, readonly signed, readonly unsigned
    message.extend_from_slice(&[1, 0, 1]);

    encode_compact_u16(3, &mut message);
    message.extend_from_slice(from);
    message.extend_from_slice(to);
    message.extend_from_slice(&SYSTEM_PROGRAM_ID);

    message.extend_from_slice(recent_blockhash);

    encode_compact_u16(1, &mut message);
    message.push(2);
    encode_compact_u16(2, &mut message);
    message.extend_from_slice(&[0, 1]);

    let mut data = Vec::with_capacity(12);
    data.extend_from_slice(&SYSTEM_TRANSFER_INSTRUCTION.to_le_bytes());
    data.extend_from_slice(&lamports.to_le_bytes());
    encode_compact_u16(data.len() as u16, &mut message);
    message.extend_from_slice(&data);

    message
}

pub fn wire_transaction(signatures: &[Vec<u8>], message: &[u8]) -> Vec<u8> {
    let mut wire = Vec::with_capacity(3 + signatures.len() * SIGNATURE_LEN + message.len());
    encode_compact_u16(signatures.len() as u16, &mut wire);
    for signature in signatures {
        wire.extend_from_slice(signature);
    }
    wire.extend_from_slice(message);
    wire
}

/// Splits a wire transaction back into signatures and message bytes.
pub fn split_wire_transaction(wire: &[u8]) -> Option<(Vec<Vec<u8>>, &[u8])> {
    let (count, consumed) = decode_compact_u16(wire)?;
    let signatures_end = consumed + usize::from(count) * SIGNATURE_LEN;
    if wire.len() < signatures_end {
        return None;
    }

    let signatures = wire[consumed..signatures_end]
        .chunks(SIGNATURE_LEN)
        .map(<[u8]>::to_vec)
        .collect();
    Some((signatures, &wire[signatures_end..]))
}
