pub(crate) mod reconcile;
