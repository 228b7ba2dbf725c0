mod fixtures;
mod weaving;
mod link_dispatch;
