pub mod context;
pub mod lifecycle;
pub mod locks;
pub mod response;
pub mod retrieval;
pub mod similarity;
pub mod store;
pub mod transfer;
pub mod types;
pub mod world;

/// Encode an embedding as little-endian `f32` bytes for a BLOB column.
pub fn embedding_to_bytes(embedding: &[f32]) -> Vec<u8> {
    embedding.iter().flat_map(|x| x.to_le_bytes()).collect()
}

/// Decode a BLOB written by [`embedding_to_bytes`]. Trailing partial values are ignored.
pub fn bytes_to_embedding(bytes: &[u8]) -> Vec<f32> {
    bytes
        .chunks_exact(4)
        .map(|c| f32::from_le_bytes([c[0], c[1], c[2], c[3]]))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn embedding_bytes_preserve_values() {
        let v = vec![0.25f32, -1.5, 3.0e-7, f32::MAX];
        let bytes = embedding_to_bytes(&v);
        assert_eq!(bytes.len(), 16);
        assert_eq!(bytes_to_embedding(&bytes), v);
    }
}
