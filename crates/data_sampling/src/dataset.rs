use crate::error::ensure_config;
use anyhow::{anyhow, Result};
use std::sync::Arc;

/// A `Dataset` provides random access to its items by index.
///
/// All implementations must be `Send + Sync` so a dataset can be shared with
/// loader worker threads behind an `Arc`.
pub trait Dataset: Send + Sync {
    type Item;

    /// Total number of items.
    fn len(&self) -> usize;

    /// Random-access lookup. Out-of-bounds indices are an error.
    fn get(&self, index: usize) -> Result<Self::Item>;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl<D: Dataset + ?Sized> Dataset for Arc<D> {
    type Item = D::Item;

    fn len(&self) -> usize {
        (**self).len()
    }

    fn get(&self, index: usize) -> Result<Self::Item> {
        (**self).get(index)
    }
}

/// A dataset that keeps all items in contiguous memory behind an `Arc<[T]>`.
///
/// Cloning the dataset only bumps the reference count; `get` clones the item
/// (a shallow tensor clone for [`Sample`](crate::sample::Sample)).
#[derive(Debug)]
pub struct InMemoryDataset<T> {
    items: Arc<[T]>,
}

impl<T> Clone for InMemoryDataset<T> {
    fn clone(&self) -> Self {
        Self {
            items: self.items.clone(),
        }
    }
}

impl<T> InMemoryDataset<T> {
    pub fn new(items: Vec<T>) -> Self {
        Self {
            items: items.into(),
        }
    }

    pub fn items(&self) -> &[T] {
        &self.items
    }
}

impl<T: Clone + Send + Sync> Dataset for InMemoryDataset<T> {
    type Item = T;

    fn len(&self) -> usize {
        self.items.len()
    }

    fn get(&self, index: usize) -> Result<T> {
        self.items.get(index).cloned().ok_or_else(|| {
            anyhow!(
                "Index {} out of bounds for dataset of size {}",
                index,
                self.items.len()
            )
        })
    }
}

/// Shared handle to a dataset of `T` items.
pub type SharedDataset<T> = Arc<dyn Dataset<Item = T>>;

/// Logical concatenation of the main dataset and every interleaved dataset.
///
/// Indexing with a global index yields `(origin, item)`: origin 0 is the main
/// dataset and origin `i + 1` the `i`-th interleaved dataset. The origin picks
/// the collator in [`InterleavedCollator`](crate::collator::InterleavedCollator).
///
/// ```text
/// datasets:          [main: 4] [aux0: 2] [aux1: 3]
/// cumulative_sizes:  [4, 6, 9]
/// global index 5  -> origin 1, local index 1
/// ```
pub struct InterleavedDataset<T> {
    datasets: Vec<SharedDataset<T>>,
    cumulative_sizes: Vec<usize>,
}

impl<T> Clone for InterleavedDataset<T> {
    fn clone(&self) -> Self {
        Self {
            datasets: self.datasets.clone(),
            cumulative_sizes: self.cumulative_sizes.clone(),
        }
    }
}

impl<T> InterleavedDataset<T> {
    pub fn new(datasets: Vec<SharedDataset<T>>) -> Result<Self> {
        ensure_config!(
            !datasets.is_empty(),
            "InterleavedDataset needs at least the main dataset"
        );
        let cumulative_sizes = datasets
            .iter()
            .scan(0usize, |total, dataset| {
                *total += dataset.len();
                Some(*total)
            })
            .collect();
        Ok(Self {
            datasets,
            cumulative_sizes,
        })
    }

    pub fn num_datasets(&self) -> usize {
        self.datasets.len()
    }

    pub fn dataset(&self, origin: usize) -> Option<&SharedDataset<T>> {
        self.datasets.get(origin)
    }

    /// Splits a global index into `(origin, local_index)`.
    pub fn locate(&self, index: usize) -> Result<(usize, usize)> {
        let origin = self.cumulative_sizes.partition_point(|&end| end <= index);
        if origin == self.datasets.len() {
            return Err(anyhow!(
                "Index {} out of bounds for interleaved dataset of size {}",
                index,
                self.len_total()
            ));
        }
        let start = match origin {
            0 => 0,
            _ => self.cumulative_sizes[origin - 1],
        };
        Ok((origin, index - start))
    }

    fn len_total(&self) -> usize {
        self.cumulative_sizes.last().copied().unwrap_or(0)
    }
}

impl<T> Dataset for InterleavedDataset<T> {
    type Item = (usize, T);

    fn len(&self) -> usize {
        self.len_total()
    }

    fn get(&self, index: usize) -> Result<(usize, T)> {
        let (origin, local) = self.locate(index)?;
        Ok((origin, self.datasets[origin].get(local)?))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    mod in_memory_dataset_tests {
        use super::*;
        use crate::sample::Sample;
        use tch::Tensor;

        #[test]
        fn random_access_and_bounds() -> Result<()> {
            let dataset = InMemoryDataset::new(vec![10, 11, 12]);
            assert_eq!(dataset.len(), 3);
            assert!(!dataset.is_empty());
            assert_eq!(dataset.get(2)?, 12);
            assert!(dataset.get(3).is_err());
            Ok(())
        }

        #[test]
        fn stores_samples() -> Result<()> {
            let samples = (0..4)
                .map(|i| Sample::from_single("x", Tensor::from_slice(&[i as i64])))
                .collect();
            let dataset = InMemoryDataset::new(samples);
            assert_eq!(dataset.get(3)?.get("x")?.int64_value(&[0]), 3);
            Ok(())
        }

        #[test]
        fn concurrent_get() {
            let dataset = Arc::new(InMemoryDataset::new((0..100).collect::<Vec<usize>>()));
            let threads: Vec<_> = (0..4)
                .map(|_| {
                    let dataset = dataset.clone();
                    std::thread::spawn(move || (0..100).all(|i| dataset.get(i).unwrap() == i))
                })
                .collect();
            for t in threads {
                assert!(t.join().unwrap());
            }
        }
    }

    mod interleaved_dataset_tests {
        use super::*;

        fn make() -> InterleavedDataset<char> {
            let datasets: Vec<SharedDataset<char>> = vec![
                Arc::new(InMemoryDataset::new(vec!['a', 'b', 'c', 'd'])),
                Arc::new(InMemoryDataset::new(vec!['x', 'y'])),
                Arc::new(InMemoryDataset::new(vec!['p', 'q', 'r'])),
            ];
            InterleavedDataset::new(datasets).unwrap()
        }

        #[test]
        fn maps_global_index_to_origin() -> Result<()> {
            let dataset = make();
            assert_eq!(dataset.len(), 9);
            assert_eq!(dataset.num_datasets(), 3);
            assert_eq!(dataset.get(0)?, (0, 'a'));
            assert_eq!(dataset.get(3)?, (0, 'd'));
            assert_eq!(dataset.get(4)?, (1, 'x'));
            assert_eq!(dataset.get(5)?, (1, 'y'));
            assert_eq!(dataset.get(6)?, (2, 'p'));
            assert_eq!(dataset.get(8)?, (2, 'r'));
            assert!(dataset.get(9).is_err());
            Ok(())
        }

        #[test]
        fn skips_empty_datasets() -> Result<()> {
            let datasets: Vec<SharedDataset<u8>> = vec![
                Arc::new(InMemoryDataset::new(vec![1])),
                Arc::new(InMemoryDataset::new(Vec::<u8>::new())),
                Arc::new(InMemoryDataset::new(vec![7])),
            ];
            let dataset = InterleavedDataset::new(datasets)?;
            assert_eq!(dataset.locate(1)?, (2, 0));
            Ok(())
        }

        #[test]
        fn requires_main_dataset() {
            assert!(InterleavedDataset::<u8>::new(vec![]).is_err());
        }
    }
}
