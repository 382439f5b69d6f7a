mod caching;
mod placement;
