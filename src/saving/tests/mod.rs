mod saving_lib;
mod stores;
