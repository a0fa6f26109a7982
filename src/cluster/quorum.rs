/// Smallest number of members that forms a majority of `cluster_size`.
pub(crate) fn majority_of(cluster_size: usize) -> usize {
    (cluster_size / 2) + 1
}

#[cfg(test)]
mod tests {
    use super::majority_of;

    #[test]
    fn majorities() {
        assert_eq!(majority_of(1), 1);
        assert_eq!(majority_of(2), 2);
        assert_eq!(majority_of(3), 2);
        assert_eq!(majority_of(4), 3);
        assert_eq!(majority_of(5), 3);
        assert_eq!(majority_of(6), 4);
    }
}
