mod kernel;
mod nest;
