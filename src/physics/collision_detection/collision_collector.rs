use std::cmp::Ordering;

/// A hit that can be reported to a `CollisionCollector`.
///
/// Every query type defines the early-out fraction its hits start with and the fraction at which a query can stop
/// looking, because nothing can beat it anymore.
pub trait CollisionResult {
    /// Early-out fraction of a collector that has not seen any hits.
    const INITIAL_EARLY_OUT_FRACTION: f32;
    /// Once the early-out fraction drops to this value the query stops.
    const SHOULD_EARLY_OUT_FRACTION: f32;

    /// Value the collector compares hits by. Smaller is closer.
    fn early_out_fraction(&self) -> f32;
}

/// Sink for the hits of a query.
///
/// The collector exposes an early-out fraction: queries skip work whose best possible result is not smaller than it,
/// and stop entirely once `should_early_out` reports true.
pub trait CollisionCollector<R: CollisionResult> {
    /// Reports a hit.
    fn add_hit(&mut self, result: R);

    /// Current early-out fraction. Hits with a larger fraction will not be accepted.
    fn early_out_fraction(&self) -> f32;

    /// Lowers the early-out fraction. Only ever moves closer.
    fn update_early_out_fraction(&mut self, fraction: f32);

    /// Resets the collector so it can be reused for another query.
    fn reset(&mut self);

    /// True when the query does not need to continue.
    #[inline]
    fn should_early_out(&self) -> bool {
        self.early_out_fraction() <= R::SHOULD_EARLY_OUT_FRACTION
    }

    /// Stops the query at the next opportunity.
    #[inline]
    fn force_early_out(&mut self) {
        self.update_early_out_fraction(R::SHOULD_EARLY_OUT_FRACTION);
    }
}

/// Keeps only the closest hit.
#[derive(Debug)]
pub struct ClosestHitCollector<R: CollisionResult> {
    pub hit: Option<R>,
    early_out_fraction: f32,
}

impl<R: CollisionResult> Default for ClosestHitCollector<R> {
    fn default() -> Self {
        Self {
            hit: None,
            early_out_fraction: R::INITIAL_EARLY_OUT_FRACTION,
        }
    }
}

impl<R: CollisionResult> ClosestHitCollector<R> {
    pub fn new() -> Self {
        Self::default()
    }

    #[inline]
    pub fn had_hit(&self) -> bool {
        self.hit.is_some()
    }
}

impl<R: CollisionResult> CollisionCollector<R> for ClosestHitCollector<R> {
    fn add_hit(&mut self, result: R) {
        let fraction = result.early_out_fraction();
        if fraction < self.early_out_fraction {
            self.update_early_out_fraction(fraction);
            self.hit = Some(result);
        }
    }

    #[inline]
    fn early_out_fraction(&self) -> f32 {
        self.early_out_fraction
    }

    #[inline]
    fn update_early_out_fraction(&mut self, fraction: f32) {
        self.early_out_fraction = self.early_out_fraction.min(fraction);
    }

    fn reset(&mut self) {
        *self = Self::default();
    }
}

/// Stops the query after the first hit.
#[derive(Debug)]
pub struct AnyHitCollector<R: CollisionResult> {
    pub hit: Option<R>,
    early_out_fraction: f32,
}

impl<R: CollisionResult> Default for AnyHitCollector<R> {
    fn default() -> Self {
        Self {
            hit: None,
            early_out_fraction: R::INITIAL_EARLY_OUT_FRACTION,
        }
    }
}

impl<R: CollisionResult> AnyHitCollector<R> {
    pub fn new() -> Self {
        Self::default()
    }

    #[inline]
    pub fn had_hit(&self) -> bool {
        self.hit.is_some()
    }
}

impl<R: CollisionResult> CollisionCollector<R> for AnyHitCollector<R> {
    fn add_hit(&mut self, result: R) {
        self.hit = Some(result);
        self.force_early_out();
    }

    #[inline]
    fn early_out_fraction(&self) -> f32 {
        self.early_out_fraction
    }

    #[inline]
    fn update_early_out_fraction(&mut self, fraction: f32) {
        self.early_out_fraction = self.early_out_fraction.min(fraction);
    }

    fn reset(&mut self) {
        *self = Self::default();
    }
}

/// Keeps every hit.
#[derive(Debug)]
pub struct AllHitCollector<R: CollisionResult> {
    pub hits: Vec<R>,
    early_out_fraction: f32,
}

impl<R: CollisionResult> Default for AllHitCollector<R> {
    fn default() -> Self {
        Self {
            hits: Vec::new(),
            early_out_fraction: R::INITIAL_EARLY_OUT_FRACTION,
        }
    }
}

impl<R: CollisionResult> AllHitCollector<R> {
    pub fn new() -> Self {
        Self::default()
    }

    #[inline]
    pub fn had_hit(&self) -> bool {
        !self.hits.is_empty()
    }

    /// Orders the hits from closest to furthest.
    pub fn sort(&mut self) {
        self.hits.sort_by(|a, b| {
            a.early_out_fraction()
                .partial_cmp(&b.early_out_fraction())
                .unwrap_or(Ordering::Equal)
        });
    }
}

impl<R: CollisionResult> CollisionCollector<R> for AllHitCollector<R> {
    #[inline]
    fn add_hit(&mut self, result: R) {
        self.hits.push(result);
    }

    #[inline]
    fn early_out_fraction(&self) -> f32 {
        self.early_out_fraction
    }

    #[inline]
    fn update_early_out_fraction(&mut self, fraction: f32) {
        self.early_out_fraction = self.early_out_fraction.min(fraction);
    }

    fn reset(&mut self) {
        self.hits.clear();
        self.early_out_fraction = R::INITIAL_EARLY_OUT_FRACTION;
    }
}
